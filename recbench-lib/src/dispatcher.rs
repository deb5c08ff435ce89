//! Turns sampled operations into executable units of work.

use std::{fmt, sync::Arc};

use rama::telemetry::tracing;
use rand::Rng;

use crate::{
    config::RunConfig,
    connector::{Connector, ConnectorError},
    identifiers::{IdentifierAllocator, Key},
    metrics::MetricsRecorder,
    sampler::{Operation, OperationSampler},
};

/// Shared by all workers of a run; hands out one [`Task`] per call.
#[derive(Debug)]
pub struct WorkDispatcher {
    sampler: OperationSampler,
    allocator: Arc<IdentifierAllocator>,
    recorder: MetricsRecorder,
}

impl WorkDispatcher {
    pub fn new(
        config: &RunConfig,
        allocator: Arc<IdentifierAllocator>,
        recorder: MetricsRecorder,
    ) -> Self {
        Self {
            sampler: OperationSampler::from_config(config),
            allocator,
            recorder,
        }
    }

    pub fn allocator(&self) -> &IdentifierAllocator {
        &self.allocator
    }

    /// Fill the record pool before the timed window starts.
    ///
    /// Resets the remote state and creates `count` records.
    /// These creates are not counted in the run statistics.
    pub async fn prepare<C: Connector>(&self, connector: &C, count: u64) -> Result<(), ConnectorError> {
        connector.prepare_run().await?;
        for _ in 0..count {
            let key = self.allocator.allocate();
            connector.create_record(&key).await?;
        }
        tracing::debug!(
            records = count,
            issued = self.allocator.issued(),
            "record pool prepared"
        );
        Ok(())
    }

    /// Sample the next operation and bind it to a key and `connector`.
    ///
    /// Creates reserve a fresh key right away, other record operations
    /// target a key sampled from the pool.
    pub fn next_task<'a, C, R>(&'a self, connector: &'a C, rng: &mut R) -> Task<'a, C>
    where
        C: Connector,
        R: Rng + ?Sized,
    {
        let operation = self.sampler.sample(rng);
        let key = match operation {
            Operation::Create => Some(self.allocator.allocate()),
            Operation::Read | Operation::Update | Operation::Delete => {
                self.allocator.sample_existing(rng)
            }
            Operation::Ping => None,
        };
        Task {
            operation,
            key,
            connector,
            recorder: &self.recorder,
        }
    }
}

/// One operation bound to its key and connector, ready to run.
pub struct Task<'a, C> {
    operation: Operation,
    key: Option<Key>,
    connector: &'a C,
    recorder: &'a MetricsRecorder,
}

impl<C> fmt::Debug for Task<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("operation", &self.operation)
            .field("key", &self.key)
            .finish()
    }
}

/// How a task that counts as completed ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Done,
    /// The target record did not exist (anymore), still a valid attempt.
    NotFound,
}

impl<C: Connector> Task<'_, C> {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Run the operation and count it on success or not found.
    pub async fn execute(self) -> Result<TaskOutcome, TaskError> {
        let operation = self.operation;
        let result = match (operation, self.key.as_ref()) {
            (Operation::Ping, _) => self.connector.ping().await,
            (_, None) => return Err(TaskError::EmptyPool(operation)),
            (Operation::Create, Some(key)) => self.connector.create_record(key).await,
            (Operation::Read, Some(key)) => self.connector.read_record(key).await,
            (Operation::Update, Some(key)) => self.connector.update_record(key).await,
            (Operation::Delete, Some(key)) => self.connector.delete_record(key).await,
        };

        let outcome = match result {
            Ok(()) => TaskOutcome::Done,
            Err(ConnectorError::NotFound) if operation.targets_existing_record() => {
                TaskOutcome::NotFound
            }
            Err(source) => {
                return Err(TaskError::Connector {
                    operation,
                    key: self.key,
                    source,
                });
            }
        };

        self.recorder.record(operation);
        Ok(outcome)
    }
}

/// Failure that ends the worker executing the task.
#[derive(Debug)]
pub enum TaskError {
    /// A record operation was sampled before any record was created.
    EmptyPool(Operation),
    Connector {
        operation: Operation,
        key: Option<Key>,
        source: ConnectorError,
    },
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::EmptyPool(op) => {
                write!(f, "TaskError: {op} sampled while the record pool is empty")
            }
            TaskError::Connector {
                operation,
                key: Some(key),
                source,
            } => write!(f, "TaskError: {operation} of '{key}' failed: {source}"),
            TaskError::Connector {
                operation,
                key: None,
                source,
            } => write!(f, "TaskError: {operation} failed: {source}"),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::EmptyPool(_) => None,
            TaskError::Connector { source, .. } => Some(source),
        }
    }
}
