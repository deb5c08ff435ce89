use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::UNIX_EPOCH,
};

use rama::{graceful::Shutdown, telemetry::tracing};
use tracing_test::traced_test;

use super::*;
use crate::{
    connector::{ConnectorError, SharedConnector},
    sampler::{Operation, OperationRates},
    test::{BrokenSink, ScriptedConnector, SharedSink},
};

fn run_config(
    rates: OperationRates,
    workers: i64,
    pool: i64,
    duration_ms: i64,
    interval_ms: i64,
) -> RunConfig {
    RunConfig::builder()
        .name("e2e")
        .rates(rates)
        .num_workers(workers)
        .initial_pool_size(pool)
        .max_duration_ms(duration_ms)
        .reporting_interval_ms(interval_ms)
        .seed(Some(42))
        .build()
        .unwrap()
}

fn sinks(throughput: &SharedSink, storage: Option<&SharedSink>) -> ReportSinks {
    ReportSinks {
        throughput: Box::new(throughput.clone()),
        storage: storage.map(|sink| Box::new(sink.clone()) as Box<dyn Write + Send>),
    }
}

/// Factory creating a fresh [`ScriptedConnector`] per call.
#[derive(Debug, Default)]
struct FailingFactory {
    created: AtomicUsize,
    shutdown: AtomicBool,
}

impl ConnectorFactory for FailingFactory {
    type Connector = ScriptedConnector;

    async fn create(&self) -> Result<Self::Connector, ConnectorError> {
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(ScriptedConnector::failing_after(3))
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl ConnectorFactory for Arc<FailingFactory> {
    type Connector = ScriptedConnector;

    fn create(&self) -> impl Future<Output = Result<Self::Connector, ConnectorError>> + Send {
        (**self).create()
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }
}

#[test]
fn test_report_timestamp() {
    for (secs, expected) in [
        (0, "1970-01-01_00.00.00"),
        (1_700_000_000, "2023-11-14_22.13.20"),
    ] {
        let time = UNIX_EPOCH + Duration::from_secs(secs);
        assert_eq!(expected, report_timestamp(time));
    }
}

#[tokio::test]
async fn test_create_report_files() {
    let data = std::env::temp_dir().join(format!("recbench-test-{:x}", rand::random::<u64>()));
    let started = UNIX_EPOCH + Duration::from_secs(1_700_000_000);

    let (mut sinks, paths) = ReportSinks::create_files(&data, "scenario-4-threads", started, true)
        .await
        .unwrap();
    sinks.throughput.write_all(b"row\n").unwrap();
    sinks.throughput.flush().unwrap();

    assert_eq!(
        data.join("scenario-4-threads-2023-11-14_22.13.20.csv"),
        paths.throughput
    );
    assert_eq!(
        Some(data.join("scenario-4-threads_DB_STORAGE-2023-11-14_22.13.20.csv")),
        paths.storage
    );
    assert_eq!("row\n", std::fs::read_to_string(&paths.throughput).unwrap());
    assert!(paths.storage.as_ref().unwrap().exists());

    let (_, paths) = ReportSinks::create_files(&data, "no-storage", started, false)
        .await
        .unwrap();
    assert!(paths.storage.is_none());

    std::fs::remove_dir_all(&data).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_only_run_reports_growing_counts() {
    let config = run_config(OperationRates::new(100, 0, 0, 0, 0), 4, 0, 2_000, 500);
    let connector = ScriptedConnector::noop();
    let factory = SharedConnector::new(connector);
    let throughput = SharedSink::default();

    let shutdown = Shutdown::new(std::future::pending::<()>());
    let summary = Orchestrator::new(config, factory.clone())
        .run(shutdown.guard(), sinks(&throughput, None))
        .await
        .unwrap();

    assert!(!summary.interrupted);
    assert_eq!(0, summary.failed_workers);
    assert!(summary.report_rows >= 3, "rows: {}", summary.report_rows);
    assert!(summary.elapsed >= Duration::from_secs(2));
    assert_eq!(1, factory.connector().prepared());

    let lines = throughput.lines();
    assert_eq!(summary.report_rows + 1, lines.len());
    assert!(lines[0].starts_with("Name;Threads;Initial size;Time;"));

    let mut previous = 0;
    for line in &lines[1..] {
        let columns: Vec<_> = line.split(';').collect();
        assert_eq!(14, columns.len(), "line: {line}");
        assert_eq!("e2e", columns[0]);
        assert_eq!("4", columns[1]);
        let creates: u64 = columns[4].parse().unwrap();
        assert!(creates >= previous, "line: {line}");
        assert_eq!("0", columns[5]);
        previous = creates;
    }
    assert!(previous > 0);
    assert!(summary.counts.create >= previous);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_not_found_reads_keep_workers_alive() {
    let config = run_config(OperationRates::new(0, 100, 0, 0, 0), 2, 10, 600, 200);
    let factory = SharedConnector::new(ScriptedConnector::not_found_on(Operation::Read));
    let throughput = SharedSink::default();

    let shutdown = Shutdown::new(std::future::pending::<()>());
    let summary = Orchestrator::new(config, factory)
        .run(shutdown.guard(), sinks(&throughput, None))
        .await
        .unwrap();

    assert_eq!(0, summary.failed_workers);
    assert!(summary.counts.read > 0);
    assert_eq!(0, summary.counts.create);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_storage_report_rows() {
    let config = RunConfig::builder()
        .name("storage")
        .rates(OperationRates::new(50, 0, 0, 0, 50))
        .num_workers(1)
        .max_duration_ms(700)
        .reporting_interval_ms(1_000)
        .report_storage(true)
        .storage_interval_ms(200)
        .build()
        .unwrap();
    let factory = SharedConnector::new(
        ScriptedConnector::noop()
            .with_storage_response("tableSize: 4096, recordCount: 8, totalSize: 65536"),
    );
    let throughput = SharedSink::default();
    let storage = SharedSink::default();

    let shutdown = Shutdown::new(std::future::pending::<()>());
    let summary = Orchestrator::new(config, factory)
        .run(shutdown.guard(), sinks(&throughput, Some(&storage)))
        .await
        .unwrap();

    assert!(summary.storage_reports >= 2, "ticks: {}", summary.storage_reports);
    let lines = storage.lines();
    assert_eq!(1 + 3 * summary.storage_reports, lines.len());
    assert_eq!(
        "Time;Table name;Table size;Number of records;Bytes per record;Database size",
        lines[0]
    );
    for (line, resource) in lines[1..]
        .iter()
        .zip(crate::metrics::STORAGE_RESOURCES.iter().cycle())
    {
        assert!(
            line.ends_with(&format!(";{resource};4096;8;512.0;65536")),
            "line: {line}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_workers_are_counted() {
    let config = run_config(OperationRates::new(100, 0, 0, 0, 0), 3, 0, 300, 100);
    let factory = Arc::new(FailingFactory::default());
    let throughput = SharedSink::default();

    let shutdown = Shutdown::new(std::future::pending::<()>());
    let summary = Orchestrator::new(config, factory.clone())
        .run(shutdown.guard(), sinks(&throughput, None))
        .await
        .unwrap();

    assert_eq!(3, summary.failed_workers);
    assert_eq!(9, summary.counts.create);
    // one connector per worker plus one for the orchestrator
    assert_eq!(4, factory.created.load(Ordering::Relaxed));
    assert!(factory.shutdown.load(Ordering::Relaxed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_report_write_failure_still_shuts_down_factory() {
    let config = run_config(OperationRates::new(100, 0, 0, 0, 0), 3, 0, 60_000, 100);
    let factory = Arc::new(FailingFactory::default());

    let shutdown = Shutdown::new(std::future::pending::<()>());
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        Orchestrator::new(config, factory.clone()).run(
            shutdown.guard(),
            ReportSinks {
                throughput: Box::new(BrokenSink),
                storage: None,
            },
        ),
    )
    .await
    .unwrap();

    assert!(result.is_err());
    assert_eq!(4, factory.created.load(Ordering::Relaxed));
    assert!(factory.shutdown.load(Ordering::Relaxed));
}

#[tokio::test]
async fn test_prepare_failure_shuts_down_factory() {
    // the orchestrator connector fails after 3 of the 10 pool records
    let config = run_config(OperationRates::new(50, 50, 0, 0, 0), 2, 10, 1_000, 100);
    let factory = Arc::new(FailingFactory::default());
    let throughput = SharedSink::default();

    let shutdown = Shutdown::new(std::future::pending::<()>());
    let result = Orchestrator::new(config, factory.clone())
        .run(shutdown.guard(), sinks(&throughput, None))
        .await;

    assert!(result.is_err());
    assert_eq!(1, factory.created.load(Ordering::Relaxed));
    assert!(factory.shutdown.load(Ordering::Relaxed));
    assert!(throughput.contents().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_interrupts_run() {
    let config = run_config(OperationRates::new(50, 0, 0, 0, 50), 2, 0, 60_000, 100);
    let factory = SharedConnector::new(ScriptedConnector::noop());
    let throughput = SharedSink::default();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = Shutdown::new(async move {
        let _ = rx.await;
    });
    let guard = shutdown.guard();

    let handle = tokio::spawn(Orchestrator::new(config, factory).run(guard, sinks(&throughput, None)));
    tokio::time::sleep(Duration::from_millis(350)).await;
    tx.send(()).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(summary.interrupted);
    assert!(summary.elapsed < Duration::from_secs(10));
    assert_eq!(0, summary.failed_workers);
    assert!(summary.report_rows >= 1);
}

#[tokio::test]
#[traced_test]
async fn test_run_logs_phases_and_progress() {
    let config = run_config(OperationRates::new(0, 0, 0, 0, 100), 1, 0, 300, 100);
    let factory = SharedConnector::new(ScriptedConnector::noop());
    let throughput = SharedSink::default();

    let shutdown = Shutdown::new(std::future::pending::<()>());
    Orchestrator::new(config, factory)
        .run(shutdown.guard(), sinks(&throughput, None))
        .await
        .unwrap();

    assert!(logs_contain("phase=preparing"));
    assert!(logs_contain("phase=running"));
    assert!(logs_contain("phase=draining"));
    assert!(logs_contain("progress: 100 %"));
}
