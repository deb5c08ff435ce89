//! Drives a single benchmark run from preparation to shutdown.
//!
//! Phases: `Preparing → Running → Draining → Done`.
//! The orchestrator is the only owner of the [`MetricsRegistry`],
//! workers only get a recorder handle to the counters.

use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use rama::{
    error::{BoxError, ErrorContext as _, OpaqueError},
    graceful::ShutdownGuard,
    telemetry::tracing,
};
use tokio::task::JoinSet;

use crate::{
    config::RunConfig,
    connector::{Connector, ConnectorFactory},
    dispatcher::WorkDispatcher,
    identifiers::{IdentifierAllocator, KeyFormat},
    metrics::{CountersSnapshot, MetricsRegistry},
    worker::{StopSignal, Worker, WorkerReport},
};

#[cfg(test)]
mod tests;

/// Interval at which the orchestrator checks for due reports and the deadline.
pub const TICK: Duration = Duration::from_millis(100);

/// Default time workers get to finish their in-flight task once stopped.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preparing,
    Running,
    Draining,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Preparing => "preparing",
            Phase::Running => "running",
            Phase::Draining => "draining",
            Phase::Done => "done",
        })
    }
}

/// Destinations of the throughput and (optional) storage report.
pub struct ReportSinks {
    pub throughput: Box<dyn Write + Send>,
    pub storage: Option<Box<dyn Write + Send>>,
}

impl fmt::Debug for ReportSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportSinks")
            .field("storage", &self.storage.is_some())
            .finish()
    }
}

impl ReportSinks {
    /// Create the report files of run `name` in the `data` directory.
    ///
    /// Files are named `<name>-<timestamp>.csv` and
    /// `<name>_DB_STORAGE-<timestamp>.csv`, the latter only when `storage` is set.
    pub async fn create_files(
        data: &Path,
        name: &str,
        started: SystemTime,
        storage: bool,
    ) -> Result<(Self, ReportPaths), OpaqueError> {
        tokio::fs::create_dir_all(data)
            .await
            .with_context(|| format!("create data directory '{}'", data.display()))?;

        let timestamp = report_timestamp(started);
        let throughput_path = data.join(format!("{name}-{timestamp}.csv"));
        let storage_path = storage.then(|| data.join(format!("{name}_DB_STORAGE-{timestamp}.csv")));

        let throughput = create_report_file(&throughput_path)?;
        let storage = storage_path
            .as_deref()
            .map(create_report_file)
            .transpose()?;

        tracing::info!(
            throughput = %throughput_path.display(),
            storage = ?storage_path,
            "report files created",
        );

        Ok((
            Self {
                throughput: Box::new(throughput),
                storage: storage.map(|file| Box::new(file) as Box<dyn Write + Send>),
            },
            ReportPaths {
                throughput: throughput_path,
                storage: storage_path,
            },
        ))
    }
}

/// Paths of the files created by [`ReportSinks::create_files`].
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub throughput: PathBuf,
    pub storage: Option<PathBuf>,
}

fn create_report_file(path: &Path) -> Result<BufWriter<File>, OpaqueError> {
    let file = File::create(path)
        .with_context(|| format!("create report file '{}'", path.display()))?;
    Ok(BufWriter::new(file))
}

/// UTC timestamp as used in report file names: `YYYY-MM-DD_HH.MM.SS`.
pub fn report_timestamp(time: SystemTime) -> String {
    humantime::format_rfc3339_seconds(time)
        .to_string()
        .trim_end_matches('Z')
        .replace('T', "_")
        .replace(':', ".")
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub name: String,
    pub counts: CountersSnapshot,
    pub report_rows: usize,
    pub storage_reports: usize,
    pub elapsed: Duration,
    /// Workers that terminated early because of a fatal task error.
    pub failed_workers: usize,
    /// The run was cut short by a shutdown request.
    pub interrupted: bool,
}

/// Owns a single run: config, connector factory and run options.
#[derive(Debug)]
pub struct Orchestrator<F> {
    config: RunConfig,
    factory: F,
    drain_timeout: Duration,
    key_format: KeyFormat,
}

impl<F: ConnectorFactory> Orchestrator<F> {
    pub fn new(config: RunConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            key_format: KeyFormat::default(),
        }
    }

    /// Time given to stopped workers before their tasks are aborted.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_key_format(mut self, format: KeyFormat) -> Self {
        self.key_format = format;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute the run, writing report rows to `sinks`.
    ///
    /// The run ends when the configured duration has elapsed
    /// or when `guard` is cancelled, whichever comes first.
    pub async fn run(
        self,
        guard: ShutdownGuard,
        mut sinks: ReportSinks,
    ) -> Result<RunSummary, BoxError> {
        let Self {
            config,
            factory,
            drain_timeout,
            key_format,
        } = self;
        let name = config.name().to_owned();

        let mut phase = Phase::Preparing;
        tracing::info!(run = %name, %phase, rates = %config.rates(), "enter phase");

        let mut registry = MetricsRegistry::new(&config);
        let allocator = Arc::new(IdentifierAllocator::new(key_format));
        let dispatcher = Arc::new(WorkDispatcher::new(
            &config,
            allocator,
            registry.recorder(),
        ));

        let connector = match factory
            .create()
            .await
            .context("create orchestrator connector")
        {
            Ok(connector) => connector,
            Err(err) => {
                factory.shutdown();
                return Err(err.into());
            }
        };
        if let Err(err) = dispatcher
            .prepare(&connector, config.initial_pool_size())
            .await
            .context("prepare record pool")
        {
            drop(connector);
            factory.shutdown();
            return Err(err.into());
        }

        let report_storage = match (config.report_storage(), sinks.storage.is_some()) {
            (true, true) => true,
            (true, false) => {
                tracing::warn!(run = %name, "storage reporting enabled without storage sink: skip");
                false
            }
            (false, _) => false,
        };

        phase = Phase::Running;
        tracing::info!(
            run = %name,
            %phase,
            workers = config.num_workers(),
            initial_pool_size = config.initial_pool_size(),
            max_duration = ?config.max_duration(),
            "enter phase"
        );

        let stop = StopSignal::new();
        let mut workers = JoinSet::new();
        // first error of the running phase, reported once the workers are drained
        let mut failure: Option<OpaqueError> = None;
        registry.start();

        for index in 0..config.num_workers() {
            let worker_connector = match factory
                .create()
                .await
                .with_context(|| format!("create connector for worker #{index}"))
            {
                Ok(connector) => connector,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };
            let worker = Worker::new(
                index,
                dispatcher.clone(),
                worker_connector,
                config.seed(),
                stop.clone(),
            );
            workers.spawn(worker.run());
        }

        let mut reports = Vec::with_capacity(config.num_workers());
        let mut report_rows = 0;
        let mut storage_reports = 0;
        let mut interrupted = false;

        let max_duration = config.max_duration();
        let mut cancelled = std::pin::pin!(guard.cancelled());

        while failure.is_none() {
            tokio::select! {
                _ = cancelled.as_mut() => {
                    tracing::info!(run = %name, "shutdown requested: stop run early");
                    interrupted = true;
                    break;
                }
                _ = tokio::time::sleep(TICK) => {}
            }

            while let Some(result) = workers.try_join_next() {
                collect_worker_result(result, &mut reports);
            }

            let now = Instant::now();

            let reported = async {
                if registry.since_last_report(now) >= config.reporting_interval() {
                    registry
                        .report_at(now, &mut sinks.throughput)
                        .context("write throughput report")?;
                    sinks
                        .throughput
                        .flush()
                        .context("flush throughput report")?;
                    report_rows += 1;

                    let elapsed = now.saturating_duration_since(registry.started_at());
                    let progress = if max_duration.is_zero() {
                        100.
                    } else {
                        (elapsed.as_secs_f64() / max_duration.as_secs_f64() * 100.).min(100.)
                    };
                    tracing::info!(run = %name, "progress: {progress:.1} %");
                }

                if report_storage
                    && registry.since_last_storage_report(now) >= config.storage_interval()
                    && let Some(sink) = sinks.storage.as_mut()
                {
                    let report = registry
                        .report_storage_at(now, sink, |resource| connector.storage_metrics(resource))
                        .await
                        .context("write storage report")?;
                    if report.is_some() {
                        sink.flush().context("flush storage report")?;
                        storage_reports += 1;
                    }
                }

                Ok::<_, OpaqueError>(())
            }
            .await;
            if let Err(err) = reported {
                failure = Some(err);
                break;
            }

            if now.saturating_duration_since(registry.started_at()) >= max_duration {
                break;
            }
        }

        phase = Phase::Draining;
        if let Some(err) = failure.as_ref() {
            tracing::error!(run = %name, %phase, "enter phase: run failed: {err}");
        } else {
            tracing::info!(run = %name, %phase, "enter phase");
        }

        stop.stop();
        let drained =
            tokio::time::timeout(drain_timeout, drain_workers(&mut workers, &mut reports)).await;
        if drained.is_err() {
            tracing::warn!(
                run = %name,
                remaining = workers.len(),
                "workers did not stop within {drain_timeout:?}: abort"
            );
            workers.abort_all();
            drain_workers(&mut workers, &mut reports).await;
        }

        let failed_workers = reports.iter().filter(|report| report.failed()).count();
        if failed_workers > 0 {
            tracing::warn!(
                run = %name,
                failed_workers,
                "workers terminated early on fatal task errors"
            );
        }

        let flushed = flush_sinks(&mut sinks);
        drop(sinks);
        drop(connector);
        factory.shutdown();

        if let Some(err) = failure {
            return Err(err.into());
        }
        flushed?;

        let summary = RunSummary {
            name,
            counts: registry.snapshot(),
            report_rows,
            storage_reports,
            elapsed: registry.started_at().elapsed(),
            failed_workers,
            interrupted,
        };

        phase = Phase::Done;
        tracing::info!(
            run = %summary.name,
            %phase,
            elapsed = ?summary.elapsed,
            records = summary.counts.records_total(),
            pings = summary.counts.ping,
            report_rows = summary.report_rows,
            "progress: 100 %"
        );

        Ok(summary)
    }
}

fn flush_sinks(sinks: &mut ReportSinks) -> Result<(), OpaqueError> {
    sinks.throughput.flush().context("flush throughput report")?;
    if let Some(sink) = sinks.storage.as_mut() {
        sink.flush().context("flush storage report")?;
    }
    Ok(())
}

async fn drain_workers(workers: &mut JoinSet<WorkerReport>, reports: &mut Vec<WorkerReport>) {
    while let Some(result) = workers.join_next().await {
        collect_worker_result(result, reports);
    }
}

fn collect_worker_result(
    result: Result<WorkerReport, tokio::task::JoinError>,
    reports: &mut Vec<WorkerReport>,
) {
    match result {
        Ok(report) => reports.push(report),
        Err(err) if err.is_cancelled() => {
            tracing::debug!("worker task aborted");
        }
        Err(err) => {
            tracing::error!("worker task panicked: {err}");
        }
    }
}
