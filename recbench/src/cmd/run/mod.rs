use std::{
    path::PathBuf,
    time::{Duration, SystemTime},
};

use rama::{
    error::{ErrorContext as _, OpaqueError},
    graceful::ShutdownGuard,
    telemetry::tracing,
};

use clap::Args;
use recbench_lib::{
    config::{ConfigurationError, RunConfig},
    connector::{
        SharedConnector,
        memory::{InMemoryRecordService, MemoryServiceConfig},
    },
    orchestrator::{Orchestrator, ReportSinks},
    suite::SuiteFile,
    utils::env,
};

use crate::config::{Scenario, ServiceConfig, WorkloadConfig, parse_seconds};

const DEFAULT_RUN_NAME: &str = "recbench";
const DEFAULT_DURATION_SECONDS: f64 = 60.;
const DEFAULT_INITIAL_POOL_SIZE: i64 = 1_000;
const DEFAULT_REPORTING_INTERVAL_MS: i64 = 1_000;
const DEFAULT_STORAGE_INTERVAL_MS: i64 = 10_000;

#[derive(Debug, Clone, Args)]
/// run benchmark(s) against the in-process record service
pub struct RunCommand {
    #[clap(flatten)]
    config: Option<WorkloadConfig>,

    #[clap(flatten)]
    service: Option<ServiceConfig>,

    #[arg(long)]
    /// Scenario to run,
    /// manually defined parameters overwrite scenario parameters.
    scenario: Option<Scenario>,

    /// Run all scenarios of the given JSON suite file, one after the other.
    ///
    /// Workload parameters are taken from the suite only.
    #[arg(long, value_name = "SUITE_FILE")]
    suite: Option<PathBuf>,

    /// Time workers get to finish their last task when a run ends.
    #[arg(long, value_name = "SECONDS", default_value_t = 5., value_parser = parse_seconds)]
    drain_timeout: f64,
}

pub async fn exec(
    data: PathBuf,
    guard: ShutdownGuard,
    args: RunCommand,
) -> Result<(), OpaqueError> {
    let service_cfg = merge_service_cfg(args.scenario, args.service);

    let runs = match args.suite {
        Some(path) => {
            if args.config.is_some() {
                tracing::warn!("workload parameters are ignored when running a suite");
            }
            SuiteFile::load(&path)
                .await?
                .runs()
                .with_context(|| format!("expand suite file '{}'", path.display()))?
        }
        None => {
            let workload_cfg = merge_workload_cfg(args.scenario, args.config);
            vec![build_run_config(&workload_cfg).context("build run config")?]
        }
    };

    let service = InMemoryRecordService::new(MemoryServiceConfig {
        base_latency: service_cfg.base_latency.unwrap_or_default(),
        jitter: service_cfg.jitter.unwrap_or_default(),
        error_rate: service_cfg.error_rate.unwrap_or_default().clamp(0.0, 1.0),
    });
    let factory = SharedConnector::new(service);
    let drain_timeout = Duration::from_secs_f64(args.drain_timeout.max(0.));

    let total = runs.len();
    tracing::info!(
        runs = total,
        data = %data.display(),
        driver = env::driver_identifier(),
        "benchmark ready"
    );

    for (index, config) in runs.into_iter().enumerate() {
        let name = config.name().to_owned();
        tracing::info!(run = %name, "execute run {} / {total}", index + 1);

        let (sinks, paths) =
            ReportSinks::create_files(&data, &name, SystemTime::now(), config.report_storage())
                .await?;

        let summary = Orchestrator::new(config, factory.clone())
            .with_drain_timeout(drain_timeout)
            .run(guard.clone(), sinks)
            .await
            .with_context(|| format!("execute run '{name}'"))?;

        tracing::info!(
            run = %summary.name,
            creates = summary.counts.create,
            reads = summary.counts.read,
            updates = summary.counts.update,
            deletes = summary.counts.delete,
            pings = summary.counts.ping,
            failed_workers = summary.failed_workers,
            elapsed = ?summary.elapsed,
            report = %paths.throughput.display(),
            storage_report = ?paths.storage,
            "run finished",
        );

        if summary.interrupted {
            tracing::info!("benchmark interrupted: skip remaining runs");
            break;
        }
    }

    Ok(())
}

fn build_run_config(cfg: &WorkloadConfig) -> Result<RunConfig, ConfigurationError> {
    let mix = cfg.mix.unwrap_or_default();
    let duration_ms = (cfg.duration.unwrap_or(DEFAULT_DURATION_SECONDS) * 1000.).round() as i64;

    RunConfig::builder()
        .name(cfg.name.as_deref().unwrap_or(DEFAULT_RUN_NAME))
        .create_rate(cfg.create_rate.unwrap_or(mix.create.into()))
        .read_rate(cfg.read_rate.unwrap_or(mix.read.into()))
        .update_rate(cfg.update_rate.unwrap_or(mix.update.into()))
        .delete_rate(cfg.delete_rate.unwrap_or(mix.delete.into()))
        .ping_rate(cfg.ping_rate.unwrap_or(mix.ping.into()))
        .num_workers(
            cfg.workers
                .unwrap_or_else(|| env::compute_default_worker_count() as i64),
        )
        .max_duration_ms(duration_ms)
        .initial_pool_size(cfg.initial_pool_size.unwrap_or(DEFAULT_INITIAL_POOL_SIZE))
        .reporting_interval_ms(
            cfg.reporting_interval
                .unwrap_or(DEFAULT_REPORTING_INTERVAL_MS),
        )
        .report_storage(cfg.report_storage.unwrap_or_default())
        .storage_interval_ms(cfg.storage_interval.unwrap_or(DEFAULT_STORAGE_INTERVAL_MS))
        .seed(cfg.seed)
        .build()
}

macro_rules! merge_config {
    ($cfg:ident, $scenario:ident, $overwrite:ident, {$($property:ident),+ $(,)?}) => {
        $cfg {
            $(
                $property: if let Some(value) = $overwrite.$property {
                    tracing::info!("property '{}': use overwrite: {value}", stringify!($property));
                    Some(value)
                } else if let Some(value) = $scenario.$property {
                    tracing::info!("property '{}': use scenario: {value}", stringify!($property));
                    Some(value)
                } else {
                    tracing::info!("property '{}': undefined", stringify!($property));
                    None
                },
            )+
        }
    };
}

fn merge_workload_cfg(scenario: Option<Scenario>, config: Option<WorkloadConfig>) -> WorkloadConfig {
    let scenario_cfg = scenario
        .map(|s| {
            tracing::info!("use scenario to define base workload: {s:?}");
            s.workload_config()
        })
        .unwrap_or_else(|| {
            tracing::info!("no scenario defined, use default as base workload");
            Default::default()
        });

    let overwrite_cfg = config.unwrap_or_default();

    merge_config!(
        WorkloadConfig, scenario_cfg, overwrite_cfg,
        {
            name,
            mix,
            create_rate,
            read_rate,
            update_rate,
            delete_rate,
            ping_rate,
            workers,
            duration,
            initial_pool_size,
            reporting_interval,
            report_storage,
            storage_interval,
            seed,
        }
    )
}

fn merge_service_cfg(scenario: Option<Scenario>, config: Option<ServiceConfig>) -> ServiceConfig {
    let scenario_cfg = scenario
        .map(|s| s.service_config())
        .unwrap_or_default();
    let overwrite_cfg = config.unwrap_or_default();

    merge_config!(
        ServiceConfig, scenario_cfg, overwrite_cfg,
        {
            base_latency,
            jitter,
            error_rate,
        }
    )
}
