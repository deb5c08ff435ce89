//! Weighted selection of the next [`Operation`] a worker performs.

use std::fmt;

use rand::Rng;

use crate::config::{ConfigurationError, RunConfig};

/// Kind of operation issued against the record service.
///
/// The declaration order is the tie-break order of the [`OperationSampler`]:
/// a draw on a threshold boundary belongs to the later operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Ping,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
        Operation::Ping,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Ping => "ping",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Returns true if the operation targets a record that must already exist.
    pub const fn targets_existing_record(self) -> bool {
        matches!(
            self,
            Operation::Read | Operation::Update | Operation::Delete
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentages of the operation mix, in [`Operation::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationRates {
    pub create: u32,
    pub read: u32,
    pub update: u32,
    pub delete: u32,
    pub ping: u32,
}

impl OperationRates {
    pub const fn new(create: u32, read: u32, update: u32, delete: u32, ping: u32) -> Self {
        Self {
            create,
            read,
            update,
            delete,
            ping,
        }
    }

    pub const fn get(&self, op: Operation) -> u32 {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
            Operation::Ping => self.ping,
        }
    }

    pub fn total(&self) -> u64 {
        Operation::ALL
            .iter()
            .map(|op| self.get(*op) as u64)
            .sum()
    }
}

impl fmt::Display for OperationRates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "c={},r={},u={},d={},p={}",
            self.create, self.read, self.update, self.delete, self.ping
        )
    }
}

/// Draws operations from the categorical distribution defined by [`OperationRates`].
///
/// Cumulative thresholds are computed once, a draw `x` in `[0, 100)`
/// resolves to the operation whose half-open interval contains it.
/// Sampling does not mutate the sampler, each worker brings its own rng.
#[derive(Debug, Clone)]
pub struct OperationSampler {
    thresholds: [u32; 5],
}

impl OperationSampler {
    pub fn new(rates: OperationRates) -> Result<Self, ConfigurationError> {
        let total = rates.total();
        if total != 100 {
            return Err(ConfigurationError::RateSum(total as i64));
        }
        Ok(Self::from_rates_unchecked(rates))
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::from_rates_unchecked(config.rates())
    }

    fn from_rates_unchecked(rates: OperationRates) -> Self {
        let mut thresholds = [0; 5];
        let mut cumulative = 0;
        for (threshold, op) in thresholds.iter_mut().zip(Operation::ALL) {
            cumulative += rates.get(op);
            *threshold = cumulative;
        }
        Self { thresholds }
    }

    pub fn thresholds(&self) -> [u32; 5] {
        self.thresholds
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Operation {
        let x = rng.random_range(0..self.thresholds[4]);
        self.resolve(x)
    }

    /// Map a draw in `[0, 100)` onto its operation.
    pub fn resolve(&self, x: u32) -> Operation {
        Operation::ALL
            .into_iter()
            .zip(self.thresholds)
            .find_map(|(op, threshold)| (x < threshold).then_some(op))
            .unwrap_or(Operation::Ping)
    }
}
