use recbench_lib::{sampler::OperationRates, utils};

use super::{ServiceConfig, WorkloadConfig};

/// High level benchmark scenarios.
/// Each scenario is a preset of workload and service behavior.
#[derive(Debug, Clone, Copy, clap::ValueEnum, Default)]
pub enum Scenario {
    /// Mixed workload against an ideal service.
    /// Used to measure pure engine overhead and regressions.
    #[default]
    Baseline,

    /// Mostly lookups of existing records.
    ReadHeavy,

    /// Mostly record creation and mutation,
    /// with storage growth reported alongside.
    WriteHeavy,

    /// Variable service latency.
    /// Used to observe how throughput follows response times.
    LatencyJitter,

    /// Service occasionally fails.
    /// Workers hitting a failure terminate, visible as throughput drops.
    FlakyService,
}

impl Scenario {
    /// Construct the concrete workload configuration
    /// associated with this scenario.
    pub fn workload_config(self) -> WorkloadConfig {
        let workers = utils::env::compute_default_worker_count() as i64;
        match self {
            Scenario::Baseline => WorkloadConfig {
                name: Some("baseline".to_owned()),
                mix: Some(OperationRates::new(20, 60, 10, 5, 5)),
                workers: Some(workers),
                duration: Some(30.),
                initial_pool_size: Some(1_000),
                reporting_interval: Some(1_000),
                ..Default::default()
            },

            Scenario::ReadHeavy => WorkloadConfig {
                name: Some("read-heavy".to_owned()),
                mix: Some(OperationRates::new(5, 90, 3, 1, 1)),
                workers: Some(workers),
                duration: Some(30.),
                initial_pool_size: Some(10_000),
                reporting_interval: Some(1_000),
                ..Default::default()
            },

            Scenario::WriteHeavy => WorkloadConfig {
                name: Some("write-heavy".to_owned()),
                mix: Some(OperationRates::new(50, 10, 30, 5, 5)),
                workers: Some(workers),
                duration: Some(30.),
                initial_pool_size: Some(1_000),
                reporting_interval: Some(1_000),
                report_storage: Some(true),
                storage_interval: Some(5_000),
                ..Default::default()
            },

            Scenario::LatencyJitter => WorkloadConfig {
                name: Some("latency-jitter".to_owned()),
                mix: Some(OperationRates::new(20, 60, 10, 5, 5)),
                // latency bound workers, oversubscribe
                workers: Some(workers * 4),
                duration: Some(30.),
                initial_pool_size: Some(1_000),
                reporting_interval: Some(1_000),
                ..Default::default()
            },

            Scenario::FlakyService => WorkloadConfig {
                name: Some("flaky-service".to_owned()),
                mix: Some(OperationRates::new(20, 60, 10, 5, 5)),
                workers: Some(workers * 2),
                duration: Some(30.),
                initial_pool_size: Some(1_000),
                reporting_interval: Some(500),
                ..Default::default()
            },
        }
    }

    /// Construct the concrete service configuration
    /// associated with this scenario.
    pub fn service_config(self) -> ServiceConfig {
        match self {
            Scenario::Baseline | Scenario::ReadHeavy | Scenario::WriteHeavy => {
                ServiceConfig::default()
            }

            Scenario::LatencyJitter => ServiceConfig {
                base_latency: Some(0.005),
                jitter: Some(0.004),
                error_rate: None,
            },

            Scenario::FlakyService => ServiceConfig {
                base_latency: Some(0.001),
                jitter: Some(0.001),
                error_rate: Some(0.0005),
            },
        }
    }
}
