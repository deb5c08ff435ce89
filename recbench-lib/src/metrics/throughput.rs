use std::{
    io::{self, Write},
    time::{Duration, Instant},
};

use super::{CountersSnapshot, MetricsRegistry, format_seconds};

const HEADER: &str = "Name;Threads;Initial size;Time;Num creates;Num reads;Num updates;Num deletes;TPS create;TPS read;TPS update;TPS delete;TPS ping;TPS overall\n";

/// One line of the throughput report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThroughputRow {
    pub elapsed: Duration,
    pub totals: CountersSnapshot,
    pub tps_create: i64,
    pub tps_read: i64,
    pub tps_update: i64,
    pub tps_delete: i64,
    pub tps_ping: i64,
    pub tps_overall: i64,
}

impl MetricsRegistry {
    /// Append a throughput row to `sink`, prefixed by the header on the first call.
    ///
    /// Throughput is computed over the interval since the previous report,
    /// or since [`MetricsRegistry::start`] for the first one.
    pub fn report<W: Write + ?Sized>(&mut self, sink: &mut W) -> io::Result<ThroughputRow> {
        self.report_at(Instant::now(), sink)
    }

    pub fn report_at<W: Write + ?Sized>(
        &mut self,
        now: Instant,
        sink: &mut W,
    ) -> io::Result<ThroughputRow> {
        let current = self.snapshot();
        let interval_ms = now.saturating_duration_since(self.last_report_at).as_millis();
        let last = self.last_counts;

        let tps = |current: u64, last: u64| -> i64 {
            if interval_ms == 0 {
                return 0;
            }
            (current.saturating_sub(last) as f64 * 1000.0 / interval_ms as f64) as i64
        };

        let row = ThroughputRow {
            elapsed: now.saturating_duration_since(self.started_at),
            totals: current,
            tps_create: tps(current.create, last.create),
            tps_read: tps(current.read, last.read),
            tps_update: tps(current.update, last.update),
            tps_delete: tps(current.delete, last.delete),
            tps_ping: tps(current.ping, last.ping),
            tps_overall: tps(current.records_total(), last.records_total()),
        };

        if !self.throughput_header_written {
            sink.write_all(HEADER.as_bytes())?;
            self.throughput_header_written = true;
        }

        writeln!(
            sink,
            "{};{};{};{};{};{};{};{};{};{};{};{};{};{}",
            self.run_name,
            self.num_workers,
            self.initial_pool_size,
            format_seconds(row.elapsed),
            row.totals.create,
            row.totals.read,
            row.totals.update,
            row.totals.delete,
            row.tps_create,
            row.tps_read,
            row.tps_update,
            row.tps_delete,
            row.tps_ping,
            row.tps_overall,
        )?;

        self.last_report_at = now;
        self.last_counts = current;

        Ok(row)
    }
}
