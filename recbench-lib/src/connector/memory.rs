//! In-process record service.
//!
//! Stands in for the remote service when running the driver locally or in tests.
//! Records live in a concurrent map, every mutation appends an audit event,
//! and latency plus failures can be injected.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::RwLock;
use rama::telemetry::tracing;

use super::{Connector, ConnectorError};
use crate::identifiers::Key;

const DOMAIN_ROW_BYTES: u64 = 512;
const RECORD_ROW_OVERHEAD_BYTES: u64 = 64;
const AUDIT_EVENT_ROW_BYTES: u64 = 160;

/// Behaviour knobs of the [`InMemoryRecordService`].
#[derive(Debug, Clone, Default)]
pub struct MemoryServiceConfig {
    /// Base latency added to every call, in seconds.
    pub base_latency: f64,
    /// Latency varies uniformly within `[-jitter, +jitter]` seconds of the base.
    pub jitter: f64,
    /// Share of calls failing with a non recoverable error, in `[0, 1]`.
    pub error_rate: f64,
}

#[derive(Debug, Default)]
pub struct InMemoryRecordService {
    config: MemoryServiceConfig,
    records: RwLock<HashMap<Key, String>>,
    audit_events: AtomicU64,
    next_value: AtomicU64,
}

impl InMemoryRecordService {
    pub fn new(config: MemoryServiceConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.records.read().contains_key(key)
    }

    pub fn audit_event_count(&self) -> u64 {
        self.audit_events.load(Ordering::Relaxed)
    }

    fn compute_delay(&self) -> Duration {
        let base = self.config.base_latency.max(0.0);
        let jitter = self.config.jitter.max(0.0);

        let seconds = if jitter == 0.0 {
            base
        } else {
            let span = jitter * 2.0;
            let u: f64 = rand::random();
            let delta = (u * span) - jitter;
            (base + delta).max(0.0)
        };

        // non-finite latency settings disable the delay
        Duration::try_from_secs_f64(seconds).unwrap_or_default()
    }

    /// Simulate the round trip: wait, then maybe fail.
    async fn round_trip(&self, op: &'static str) -> Result<(), ConnectorError> {
        let delay = self.compute_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let error_rate = self.config.error_rate.clamp(0.0, 1.0);
        if error_rate > 0.0 && rand::random_bool(error_rate) {
            tracing::trace!(%op, "in-memory record service: inject failure");
            return Err(ConnectorError::other(format!(
                "injected failure for {op} operation"
            )));
        }

        Ok(())
    }

    fn audit(&self) {
        self.audit_events.fetch_add(1, Ordering::Relaxed);
    }

    fn new_value(&self) -> String {
        let n = self.next_value.fetch_add(1, Ordering::Relaxed);
        format!("psn-{:016x}", n.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    fn pseudonym_table_size(&self) -> (u64, u64) {
        let records = self.records.read();
        let bytes = records
            .iter()
            .map(|(key, value)| {
                key.as_str().len() as u64 + value.len() as u64 + RECORD_ROW_OVERHEAD_BYTES
            })
            .sum();
        (bytes, records.len() as u64)
    }
}

impl Connector for InMemoryRecordService {
    async fn prepare_run(&self) -> Result<(), ConnectorError> {
        self.records.write().clear();
        self.audit_events.store(0, Ordering::Relaxed);
        tracing::debug!("in-memory record service: state cleared");
        Ok(())
    }

    async fn create_record(&self, key: &Key) -> Result<(), ConnectorError> {
        self.round_trip("create").await?;
        let value = self.new_value();
        let mut records = self.records.write();
        if records.contains_key(key) {
            return Err(ConnectorError::other(format!("record '{key}' already exists")));
        }
        records.insert(key.clone(), value);
        drop(records);
        self.audit();
        Ok(())
    }

    async fn read_record(&self, key: &Key) -> Result<(), ConnectorError> {
        self.round_trip("read").await?;
        if !self.contains(key) {
            return Err(ConnectorError::NotFound);
        }
        self.audit();
        Ok(())
    }

    async fn update_record(&self, key: &Key) -> Result<(), ConnectorError> {
        self.round_trip("update").await?;
        let value = self.new_value();
        match self.records.write().get_mut(key) {
            Some(current) => *current = value,
            None => return Err(ConnectorError::NotFound),
        }
        self.audit();
        Ok(())
    }

    async fn delete_record(&self, key: &Key) -> Result<(), ConnectorError> {
        self.round_trip("delete").await?;
        if self.records.write().remove(key).is_none() {
            return Err(ConnectorError::NotFound);
        }
        self.audit();
        Ok(())
    }

    async fn ping(&self) -> Result<(), ConnectorError> {
        self.round_trip("ping").await
    }

    async fn storage_metrics(&self, resource: &str) -> Result<String, ConnectorError> {
        let (pseudonym_size, pseudonym_count) = self.pseudonym_table_size();
        let audit_count = self.audit_event_count();
        let audit_size = audit_count * AUDIT_EVENT_ROW_BYTES;
        let total_size = DOMAIN_ROW_BYTES + pseudonym_size + audit_size;

        let (table_size, record_count) = match resource {
            "domain" => (DOMAIN_ROW_BYTES, 1),
            "pseudonym" => (pseudonym_size, pseudonym_count),
            "auditevent" => (audit_size, audit_count),
            _ => {
                return Err(ConnectorError::other(format!(
                    "unknown storage resource '{resource}'"
                )));
            }
        };

        Ok(format!(
            "tableSize: {table_size}, recordCount: {record_count}, totalSize: {total_size}"
        ))
    }
}
