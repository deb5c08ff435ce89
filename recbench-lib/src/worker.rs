//! Background execution units of a run.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use rama::telemetry::tracing;
use rand::{SeedableRng as _, rngs::SmallRng};

use crate::{
    connector::Connector,
    dispatcher::{TaskError, WorkDispatcher},
};

/// Cooperative stop flag shared by the orchestrator and its workers.
///
/// Workers only look at it between tasks, a task in flight always completes.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Stopped,
}

/// Pulls tasks from the [`WorkDispatcher`] and executes them
/// on its own connector until stopped or a task fails.
#[derive(Debug)]
pub struct Worker<C> {
    index: usize,
    dispatcher: Arc<WorkDispatcher>,
    connector: C,
    rng: SmallRng,
    stop: StopSignal,
}

/// What a worker did before it stopped.
#[derive(Debug)]
pub struct WorkerReport {
    pub index: usize,
    pub completed: u64,
    /// Set if the worker ended on a fatal task error instead of the stop signal.
    pub error: Option<TaskError>,
}

impl WorkerReport {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

impl<C: Connector> Worker<C> {
    /// Create a worker; with a seed its rng is derived from `seed + index`,
    /// otherwise it is seeded by the OS.
    pub fn new(
        index: usize,
        dispatcher: Arc<WorkDispatcher>,
        connector: C,
        seed: Option<u64>,
        stop: StopSignal,
    ) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => SmallRng::from_os_rng(),
        };
        Self {
            index,
            dispatcher,
            connector,
            rng,
            stop,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Run tasks until the stop signal is observed or a task fails.
    ///
    /// There is no retry: a failed task ends the worker for the rest of the run.
    pub async fn run(mut self) -> WorkerReport {
        let mut state = WorkerState::Running;
        let mut completed = 0;
        tracing::debug!(worker = self.index, ?state, "worker started");

        while !self.stop.is_stopped() {
            let task = self.dispatcher.next_task(&self.connector, &mut self.rng);
            let operation = task.operation();

            if let Err(err) = task.execute().await {
                state = WorkerState::Stopped;
                tracing::error!(
                    worker = self.index,
                    %operation,
                    completed,
                    ?state,
                    "worker terminated by fatal task error: {err}"
                );
                return WorkerReport {
                    index: self.index,
                    completed,
                    error: Some(err),
                };
            }
            completed += 1;

            // connector calls might complete without ever suspending
            tokio::task::yield_now().await;
        }

        state = WorkerState::Stopped;
        tracing::debug!(worker = self.index, completed, ?state, "worker stopped");
        WorkerReport {
            index: self.index,
            completed,
            error: None,
        }
    }
}
