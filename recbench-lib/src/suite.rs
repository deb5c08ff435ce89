//! Benchmark suites: several scenarios sharing one set of run parameters.
//!
//! ```json
//! {
//!   "benchmark": {
//!     "initialDbSize": 1000,
//!     "maxTime": 60000,
//!     "reportingInterval": 1000,
//!     "reportDbSpace": true,
//!     "reportingIntervalDbSpace": 10000,
//!     "numThreads": 8,
//!     "numberOfRepetitions": 3,
//!     "scenarios": [
//!       { "name": "read-heavy", "createRate": 10, "readRate": 80, "pingRate": 10 }
//!     ]
//!   }
//! }
//! ```

use std::path::Path;

use rama::{
    error::{ErrorContext as _, OpaqueError},
    telemetry::tracing,
};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigurationError, RunConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteFile {
    pub benchmark: SuiteConfig,
}

/// Parameters shared by all scenarios of a suite.
///
/// Durations and intervals are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteConfig {
    #[serde(default)]
    pub initial_db_size: i64,
    pub max_time: i64,
    pub reporting_interval: i64,
    #[serde(default)]
    pub report_db_space: bool,
    #[serde(default)]
    pub reporting_interval_db_space: i64,
    pub num_threads: i64,
    #[serde(default = "default_repetitions")]
    pub number_of_repetitions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub scenarios: Vec<SuiteScenario>,
}

fn default_repetitions() -> u32 {
    1
}

/// Operation mix of one scenario, absent rates are zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteScenario {
    pub name: String,
    #[serde(default)]
    pub create_rate: i64,
    #[serde(default)]
    pub read_rate: i64,
    #[serde(default)]
    pub update_rate: i64,
    #[serde(default)]
    pub delete_rate: i64,
    #[serde(default)]
    pub ping_rate: i64,
}

impl SuiteFile {
    /// Read and decode a suite file.
    pub async fn load(path: &Path) -> Result<Self, OpaqueError> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("read suite file '{}'", path.display()))?;
        Self::from_json_slice(&raw)
            .with_context(|| format!("json-decode suite file '{}'", path.display()))
    }

    pub fn from_json_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Expand the suite into its runs, in execution order.
    ///
    /// Each scenario is repeated `numberOfRepetitions` times
    /// and named `<scenario>-<threads>-threads`.
    pub fn runs(&self) -> Result<Vec<RunConfig>, ConfigurationError> {
        let cfg = &self.benchmark;
        let repetitions = cfg.number_of_repetitions as usize;
        let mut runs = Vec::with_capacity(cfg.scenarios.len() * repetitions);

        for scenario in &cfg.scenarios {
            let run = RunConfig::builder()
                .name(format!("{}-{}-threads", scenario.name, cfg.num_threads))
                .create_rate(scenario.create_rate)
                .read_rate(scenario.read_rate)
                .update_rate(scenario.update_rate)
                .delete_rate(scenario.delete_rate)
                .ping_rate(scenario.ping_rate)
                .num_workers(cfg.num_threads)
                .initial_pool_size(cfg.initial_db_size)
                .max_duration_ms(cfg.max_time)
                .reporting_interval_ms(cfg.reporting_interval)
                .report_storage(cfg.report_db_space)
                .storage_interval_ms(cfg.reporting_interval_db_space)
                .seed(cfg.seed)
                .build()?;

            tracing::debug!(
                run = %run.name(),
                repetitions,
                rates = %run.rates(),
                "suite scenario expanded"
            );
            runs.extend(std::iter::repeat_n(run, repetitions));
        }

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sampler::OperationRates;

    const SUITE: &str = r#"{
        "benchmark": {
            "initialDbSize": 500,
            "maxTime": 30000,
            "reportingInterval": 1000,
            "reportDbSpace": true,
            "reportingIntervalDbSpace": 5000,
            "numThreads": 8,
            "numberOfRepetitions": 2,
            "scenarios": [
                { "name": "read-heavy", "createRate": 10, "readRate": 80, "pingRate": 10 },
                { "name": "write-only", "createRate": 100 }
            ]
        }
    }"#;

    #[test]
    fn test_suite_expands_repetitions_in_order() {
        let suite = SuiteFile::from_json_slice(SUITE.as_bytes()).unwrap();
        let runs = suite.runs().unwrap();

        let names: Vec<_> = runs.iter().map(|run| run.name()).collect();
        assert_eq!(
            vec![
                "read-heavy-8-threads",
                "read-heavy-8-threads",
                "write-only-8-threads",
                "write-only-8-threads",
            ],
            names
        );

        let first = &runs[0];
        assert_eq!(OperationRates::new(10, 80, 0, 0, 10), first.rates());
        assert_eq!(8, first.num_workers());
        assert_eq!(500, first.initial_pool_size());
        assert_eq!(Duration::from_secs(30), first.max_duration());
        assert_eq!(Duration::from_secs(1), first.reporting_interval());
        assert!(first.report_storage());
        assert_eq!(Duration::from_secs(5), first.storage_interval());
        assert_eq!(OperationRates::new(100, 0, 0, 0, 0), runs[3].rates());
    }

    #[test]
    fn test_suite_rejects_invalid_scenario() {
        for (input, expected) in [
            (
                r#"{"benchmark":{"maxTime":1000,"reportingInterval":100,"numThreads":1,
                    "scenarios":[{"name":"bad","createRate":50}]}}"#,
                Some(ConfigurationError::RateSum(50)),
            ),
            (
                r#"{"benchmark":{"maxTime":1000,"reportingInterval":100,"numThreads":1,
                    "scenarios":[{"name":"empty","readRate":100}]}}"#,
                Some(ConfigurationError::EmptyPool(crate::sampler::Operation::Read)),
            ),
            (
                r#"{"benchmark":{"maxTime":1000,"reportingInterval":100,"numThreads":1,
                    "scenarios":[{"name":"ok","pingRate":100}]}}"#,
                None,
            ),
        ] {
            let suite = SuiteFile::from_json_slice(input.as_bytes()).unwrap();
            match (suite.runs(), expected) {
                (Ok(runs), None) => assert_eq!(1, runs.len(), "input: '{input}'"),
                (Err(err), Some(expected)) => assert_eq!(expected, err, "input: '{input}'"),
                (result, expected) => panic!(
                    "input = '{input}', unexpected result '{result:?}', expected: '{expected:?}'"
                ),
            }
        }
    }

    #[test]
    fn test_suite_requires_core_parameters() {
        assert!(SuiteFile::from_json_slice(br#"{"benchmark":{"scenarios":[]}}"#).is_err());
        assert!(SuiteFile::from_json_slice(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let result = SuiteFile::load(Path::new("/nonexistent/recbench/suite.json")).await;
        assert!(result.is_err());
    }
}
