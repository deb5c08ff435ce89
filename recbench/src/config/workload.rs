use recbench_lib::sampler::OperationRates;

use super::{parse_operation_mix, parse_seconds};

/// Workload of a single run.
/// This models what the workers do and for how long.
#[derive(Debug, Clone, clap::Args, Default)]
pub struct WorkloadConfig {
    /// Name of the run, used in the reports and their file names.
    #[arg(long)]
    pub name: Option<String>,

    /// Operation mix in percent, e.g. `c=20,r=60,u=10,d=5,p=5`.
    #[arg(long, value_parser = parse_operation_mix)]
    pub mix: Option<OperationRates>,

    /// Create rate in percent, overwrites the mix.
    #[arg(long = "create", value_name = "PERCENT", allow_negative_numbers = true)]
    pub create_rate: Option<i64>,

    /// Read rate in percent, overwrites the mix.
    #[arg(long = "read", value_name = "PERCENT", allow_negative_numbers = true)]
    pub read_rate: Option<i64>,

    /// Update rate in percent, overwrites the mix.
    #[arg(long = "update", value_name = "PERCENT", allow_negative_numbers = true)]
    pub update_rate: Option<i64>,

    /// Delete rate in percent, overwrites the mix.
    #[arg(long = "delete", value_name = "PERCENT", allow_negative_numbers = true)]
    pub delete_rate: Option<i64>,

    /// Ping rate in percent, overwrites the mix.
    #[arg(long = "ping", value_name = "PERCENT", allow_negative_numbers = true)]
    pub ping_rate: Option<i64>,

    /// Number of concurrent workers.
    #[arg(long, value_name = "N")]
    pub workers: Option<i64>,

    /// Length of the timed window.
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub duration: Option<f64>,

    /// Records created before the timed window starts.
    #[arg(long, value_name = "N")]
    pub initial_pool_size: Option<i64>,

    /// Interval between throughput report rows.
    #[arg(long, value_name = "MILLISECONDS")]
    pub reporting_interval: Option<i64>,

    /// Also report the storage consumption of the service.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub report_storage: Option<bool>,

    /// Interval between storage reports.
    #[arg(long, value_name = "MILLISECONDS")]
    pub storage_interval: Option<i64>,

    /// Seed for the worker rngs, for reproducible operation sequences.
    #[arg(long)]
    pub seed: Option<u64>,
}
