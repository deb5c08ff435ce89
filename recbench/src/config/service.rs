use super::parse_seconds;

/// Behaviour of the in-process record service the runs are driven against.
#[derive(Debug, Clone, clap::Args, Default)]
pub struct ServiceConfig {
    /// Base latency added to every service call.
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub base_latency: Option<f64>,

    /// Random variation of the latency around the base.
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub jitter: Option<f64>,

    /// Share of service calls failing, in the range `[0, 1]`.
    #[arg(long, value_name = "RATIO")]
    pub error_rate: Option<f64>,
}
