use std::{
    fmt,
    io::{self, Write},
    time::{Duration, Instant},
};

use rama::telemetry::tracing;

use super::{MetricsRegistry, format_seconds};
use crate::connector::ConnectorError;

/// Remote resources whose storage consumption is reported.
pub const STORAGE_RESOURCES: [&str; 3] = ["domain", "pseudonym", "auditevent"];

const HEADER: &str = "Time;Table name;Table size;Number of records;Bytes per record;Database size\n";

const TABLE_SIZE: &str = "tableSize:";
const RECORD_COUNT: &str = "recordCount:";
const TOTAL_SIZE: &str = "totalSize:";

/// Storage consumption of a single remote resource,
/// as reported by `tableSize: N, recordCount: N, totalSize: N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageSample {
    pub table_size: u64,
    pub record_count: u64,
    pub total_size: u64,
}

impl StorageSample {
    pub fn parse(input: &str) -> Result<Self, StorageParseError> {
        let table_start = find_after(input, TABLE_SIZE)?;
        let record_marker = find(input, RECORD_COUNT)?;
        let record_start = record_marker + RECORD_COUNT.len();
        let total_marker = find(input, TOTAL_SIZE)?;
        let total_start = total_marker + TOTAL_SIZE.len();

        if !(table_start <= record_marker && record_start <= total_marker) {
            return Err(StorageParseError::UnexpectedOrder);
        }

        Ok(Self {
            table_size: parse_field(TABLE_SIZE, &input[table_start..record_marker])?,
            record_count: parse_field(RECORD_COUNT, &input[record_start..total_marker])?,
            total_size: parse_field(TOTAL_SIZE, &input[total_start..])?,
        })
    }

    /// Average table bytes per record, zero for an empty table.
    pub fn bytes_per_record(&self) -> f64 {
        if self.record_count == 0 {
            return 0.;
        }
        self.table_size as f64 / self.record_count as f64
    }
}

fn find(input: &str, marker: &'static str) -> Result<usize, StorageParseError> {
    input
        .find(marker)
        .ok_or(StorageParseError::MissingField(marker))
}

fn find_after(input: &str, marker: &'static str) -> Result<usize, StorageParseError> {
    find(input, marker).map(|idx| idx + marker.len())
}

fn parse_field(marker: &'static str, raw: &str) -> Result<u64, StorageParseError> {
    let value = raw.trim().trim_end_matches(',').trim();
    value
        .parse()
        .map_err(|_| StorageParseError::InvalidNumber {
            field: marker,
            value: value.to_owned(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageParseError {
    MissingField(&'static str),
    UnexpectedOrder,
    InvalidNumber { field: &'static str, value: String },
}

impl fmt::Display for StorageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageParseError::MissingField(field) => {
                write!(f, "StorageParseError: missing field '{field}'")
            }
            StorageParseError::UnexpectedOrder => {
                write!(f, "StorageParseError: fields are not in the expected order")
            }
            StorageParseError::InvalidNumber { field, value } => write!(
                f,
                "StorageParseError: field '{field}' is not a number: '{value}'"
            ),
        }
    }
}

impl std::error::Error for StorageParseError {}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageRow {
    pub resource: &'static str,
    pub sample: StorageSample,
}

/// Rows written by a single storage report tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageReport {
    pub elapsed: Duration,
    pub rows: Vec<StorageRow>,
}

impl MetricsRegistry {
    /// Probe every resource in [`STORAGE_RESOURCES`] and append one row per resource.
    ///
    /// This is best-effort instrumentation: if any probe fails or returns a
    /// malformed response nothing is written for this tick, the last storage
    /// report time is left untouched and `Ok(None)` is returned.
    pub async fn report_storage<W, P, Fut>(
        &mut self,
        sink: &mut W,
        probe: P,
    ) -> io::Result<Option<StorageReport>>
    where
        W: Write + ?Sized,
        P: FnMut(&'static str) -> Fut,
        Fut: Future<Output = Result<String, ConnectorError>>,
    {
        self.report_storage_at(Instant::now(), sink, probe).await
    }

    pub async fn report_storage_at<W, P, Fut>(
        &mut self,
        now: Instant,
        sink: &mut W,
        mut probe: P,
    ) -> io::Result<Option<StorageReport>>
    where
        W: Write + ?Sized,
        P: FnMut(&'static str) -> Fut,
        Fut: Future<Output = Result<String, ConnectorError>>,
    {
        let mut rows = Vec::with_capacity(STORAGE_RESOURCES.len());
        for resource in STORAGE_RESOURCES {
            let response = match probe(resource).await {
                Ok(response) => response,
                Err(err) => {
                    self.skip_storage_tick(resource, &err);
                    return Ok(None);
                }
            };
            match StorageSample::parse(&response) {
                Ok(sample) => rows.push(StorageRow { resource, sample }),
                Err(err) => {
                    self.skip_storage_tick(resource, &format_args!("{err}: '{response}'"));
                    return Ok(None);
                }
            }
        }
        self.storage_skipping = false;

        let report = StorageReport {
            elapsed: now.saturating_duration_since(self.started_at),
            rows,
        };

        if !self.storage_header_written {
            sink.write_all(HEADER.as_bytes())?;
            self.storage_header_written = true;
        }

        let time = format_seconds(report.elapsed);
        for StorageRow { resource, sample } in &report.rows {
            writeln!(
                sink,
                "{time};{resource};{};{};{:?};{}",
                sample.table_size,
                sample.record_count,
                sample.bytes_per_record(),
                sample.total_size,
            )?;
        }

        self.last_storage_report_at = now;
        Ok(Some(report))
    }

    /// The next tick retries, so only the first skip of a streak is a warning.
    fn skip_storage_tick(&mut self, resource: &str, reason: &dyn fmt::Display) {
        if self.storage_skipping {
            tracing::debug!(%resource, "skip storage report: {reason}");
        } else {
            tracing::warn!(%resource, "skip storage report: {reason}");
            self.storage_skipping = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use rama::error::BoxError;
    use tracing_test::traced_test;

    use super::*;
    use crate::metrics::tests::test_config;

    #[test]
    fn test_parse_storage_sample() {
        for (input, expected) in [
            (
                "tableSize: 8192, recordCount: 4, totalSize: 1048576",
                Some(StorageSample {
                    table_size: 8192,
                    record_count: 4,
                    total_size: 1048576,
                }),
            ),
            (
                "storage of domain: tableSize:10,recordCount:0,totalSize:99",
                Some(StorageSample {
                    table_size: 10,
                    record_count: 0,
                    total_size: 99,
                }),
            ),
            ("tableSize: 1, recordCount: 2", None),
            ("recordCount: 2, tableSize: 1, totalSize: 3", None),
            ("tableSize: x, recordCount: 2, totalSize: 3", None),
            ("", None),
        ] {
            let result = StorageSample::parse(input);
            match (result, expected) {
                (Ok(result), Some(expected)) => assert_eq!(expected, result, "input: '{input}'"),
                (Err(_), None) => (),
                (result, expected) => panic!(
                    "input = '{input}', unexpected result '{result:?}', expected: '{expected:?}'"
                ),
            }
        }
    }

    #[test]
    fn test_bytes_per_record() {
        let sample = StorageSample {
            table_size: 1024,
            record_count: 3,
            total_size: 0,
        };
        assert!((sample.bytes_per_record() - 341.333).abs() < 0.001);
        assert_eq!(
            0.,
            StorageSample {
                record_count: 0,
                ..sample
            }
            .bytes_per_record()
        );
    }

    #[tokio::test]
    async fn test_report_storage_writes_rows_per_resource() {
        let mut registry = MetricsRegistry::new(&test_config());
        let t0 = Instant::now();
        registry.start_at(t0);

        let mut sink = Vec::new();
        for tick in 1..=2 {
            let report = registry
                .report_storage_at(
                    t0 + Duration::from_millis(tick * 500),
                    &mut sink,
                    |resource| async move {
                        Ok(format!(
                            "tableSize: {}, recordCount: 2, totalSize: 4096",
                            resource.len() * 100
                        ))
                    },
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(3, report.rows.len());
        }

        let output = String::from_utf8(sink).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(7, lines.len());
        assert_eq!(HEADER.trim_end(), lines[0]);
        assert_eq!("0,5;domain;600;2;300.0;4096", lines[1]);
        assert_eq!("0,5;pseudonym;900;2;450.0;4096", lines[2]);
        assert_eq!("0,5;auditevent;1000;2;500.0;4096", lines[3]);
        assert_eq!("1,0;domain;600;2;300.0;4096", lines[4]);
        assert_eq!(
            Duration::ZERO,
            registry.since_last_storage_report(t0 + Duration::from_millis(1_000))
        );
    }

    #[tokio::test]
    async fn test_report_storage_skips_malformed_tick() {
        let mut registry = MetricsRegistry::new(&test_config());
        let t0 = Instant::now();
        registry.start_at(t0);

        let mut sink = Vec::new();
        let report = registry
            .report_storage_at(t0 + Duration::from_secs(1), &mut sink, |resource| async move {
                if resource == "pseudonym" {
                    Ok("service unavailable".to_owned())
                } else {
                    Ok("tableSize: 1, recordCount: 1, totalSize: 1".to_owned())
                }
            })
            .await
            .unwrap();

        assert!(report.is_none());
        assert!(sink.is_empty());
        assert_eq!(
            Duration::from_secs(2),
            registry.since_last_storage_report(t0 + Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn test_report_storage_skips_failed_probe() {
        let mut registry = MetricsRegistry::new(&test_config());
        let t0 = Instant::now();
        registry.start_at(t0);

        let mut sink = Vec::new();
        let report = registry
            .report_storage_at(t0, &mut sink, |_| async {
                Err(ConnectorError::Other(BoxError::from("connection refused")))
            })
            .await
            .unwrap();
        assert!(report.is_none());

        // header still follows on the first successful tick
        registry
            .report_storage_at(t0, &mut sink, |_| async {
                Ok("tableSize: 1, recordCount: 1, totalSize: 1".to_owned())
            })
            .await
            .unwrap()
            .unwrap();
        assert!(String::from_utf8(sink).unwrap().starts_with("Time;"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failing_storage_metrics_warn_once_per_streak() {
        let mut registry = MetricsRegistry::new(&test_config());
        let t0 = Instant::now();
        registry.start_at(t0);

        let mut sink = Vec::new();
        for tick in 1..=5 {
            let report = registry
                .report_storage_at(t0 + Duration::from_millis(100 * tick), &mut sink, |_| async {
                    Err(ConnectorError::Other(BoxError::from("connection refused")))
                })
                .await
                .unwrap();
            assert!(report.is_none());
        }

        logs_assert(|lines: &[&str]| {
            let warnings = lines
                .iter()
                .filter(|line| line.contains("WARN") && line.contains("skip storage report"))
                .count();
            match warnings {
                1 => Ok(()),
                n => Err(format!("expected a single warning, got {n}")),
            }
        });
        assert!(logs_contain("DEBUG"));
    }
}
