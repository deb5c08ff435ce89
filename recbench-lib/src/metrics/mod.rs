//! Operation statistics of a run.
//!
//! Workers count completed operations through a cloneable [`MetricsRecorder`],
//! which only ever increments atomics. Deriving throughput and writing report
//! rows happens in the [`MetricsRegistry`], which requires `&mut self` and is
//! owned by the orchestrator alone.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{config::RunConfig, sampler::Operation};

mod storage;
mod throughput;

pub use self::{
    storage::{STORAGE_RESOURCES, StorageParseError, StorageReport, StorageRow, StorageSample},
    throughput::ThroughputRow,
};

#[derive(Debug, Default)]
struct OperationCounters {
    counts: [AtomicU64; 5],
}

/// Point in time copy of the operation counters.
///
/// Counters are read one by one, a snapshot taken while
/// workers are active is not atomic across kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub create: u64,
    pub read: u64,
    pub update: u64,
    pub delete: u64,
    pub ping: u64,
}

impl CountersSnapshot {
    pub fn get(&self, op: Operation) -> u64 {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
            Operation::Ping => self.ping,
        }
    }

    /// Sum of all record operations, pings excluded.
    pub fn records_total(&self) -> u64 {
        self.create + self.read + self.update + self.delete
    }
}

/// Handle used by workers to count completed operations.
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    counters: Arc<OperationCounters>,
}

impl MetricsRecorder {
    pub fn record(&self, op: Operation) {
        self.counters.counts[op.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_create(&self) {
        self.record(Operation::Create)
    }

    pub fn record_read(&self) {
        self.record(Operation::Read)
    }

    pub fn record_update(&self) {
        self.record(Operation::Update)
    }

    pub fn record_delete(&self) {
        self.record(Operation::Delete)
    }

    pub fn record_ping(&self) {
        self.record(Operation::Ping)
    }
}

/// Counters of a run plus the bookkeeping needed to report on them.
#[derive(Debug)]
pub struct MetricsRegistry {
    counters: Arc<OperationCounters>,

    run_name: String,
    num_workers: usize,
    initial_pool_size: u64,

    started_at: Instant,
    last_report_at: Instant,
    last_storage_report_at: Instant,
    last_counts: CountersSnapshot,

    throughput_header_written: bool,
    storage_header_written: bool,
    /// Set while storage probes keep failing, to warn only once per streak.
    storage_skipping: bool,
}

impl MetricsRegistry {
    pub fn new(config: &RunConfig) -> Self {
        let now = Instant::now();
        Self {
            counters: Arc::default(),
            run_name: config.name().to_owned(),
            num_workers: config.num_workers(),
            initial_pool_size: config.initial_pool_size(),
            started_at: now,
            last_report_at: now,
            last_storage_report_at: now,
            last_counts: CountersSnapshot::default(),
            throughput_header_written: false,
            storage_header_written: false,
            storage_skipping: false,
        }
    }

    pub fn recorder(&self) -> MetricsRecorder {
        MetricsRecorder {
            counters: self.counters.clone(),
        }
    }

    /// Mark the start of the timed window.
    ///
    /// Elapsed times and the first throughput interval are measured from here.
    pub fn start(&mut self) {
        self.start_at(Instant::now())
    }

    pub fn start_at(&mut self, now: Instant) {
        self.started_at = now;
        self.last_report_at = now;
        self.last_storage_report_at = now;
        self.last_counts = self.snapshot();
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn since_last_report(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_report_at)
    }

    pub fn since_last_storage_report(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_storage_report_at)
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let load = |op: Operation| self.counters.counts[op.index()].load(Ordering::Relaxed);
        CountersSnapshot {
            create: load(Operation::Create),
            read: load(Operation::Read),
            update: load(Operation::Update),
            delete: load(Operation::Delete),
            ping: load(Operation::Ping),
        }
    }
}

/// Seconds as a decimal with a comma separator, e.g. `1,5`.
fn format_seconds(elapsed: Duration) -> String {
    format!("{:?}", elapsed.as_millis() as f64 / 1000.0).replace('.', ",")
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn test_config() -> RunConfig {
        RunConfig::builder()
            .name("metrics")
            .create_rate(40)
            .read_rate(30)
            .update_rate(10)
            .delete_rate(10)
            .ping_rate(10)
            .num_workers(3)
            .initial_pool_size(100)
            .max_duration_ms(10_000)
            .reporting_interval_ms(1_000)
            .build()
            .unwrap()
    }

    #[test]
    fn test_recorder_counts_per_kind() {
        let registry = MetricsRegistry::new(&test_config());
        let recorder = registry.recorder();

        recorder.record_create();
        recorder.record_create();
        recorder.record_read();
        recorder.record_update();
        recorder.record_delete();
        recorder.record_ping();
        recorder.record(Operation::Ping);

        let snapshot = registry.snapshot();
        assert_eq!(
            CountersSnapshot {
                create: 2,
                read: 1,
                update: 1,
                delete: 1,
                ping: 2,
            },
            snapshot
        );
        assert_eq!(5, snapshot.records_total());
    }

    #[test]
    fn test_concurrent_recording() {
        let registry = MetricsRegistry::new(&test_config());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let recorder = registry.recorder();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        recorder.record_read();
                        recorder.record_ping();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(40_000, snapshot.read);
        assert_eq!(40_000, snapshot.ping);
        assert_eq!(0, snapshot.create);
    }

    #[test]
    fn test_format_seconds_uses_decimal_comma() {
        assert_eq!("0,0", format_seconds(Duration::ZERO));
        assert_eq!("1,5", format_seconds(Duration::from_millis(1_500)));
        assert_eq!("2,0", format_seconds(Duration::from_secs(2)));
        assert_eq!("12,345", format_seconds(Duration::from_millis(12_345)));
    }
}
