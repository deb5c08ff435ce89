//! Validated description of a single benchmark run.

use std::{fmt, time::Duration};

use crate::sampler::{Operation, OperationRates};

/// Immutable, validated run configuration.
///
/// Can only be created through [`RunConfig::builder`],
/// so every instance satisfies the run invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    name: String,
    rates: OperationRates,
    num_workers: usize,
    max_duration: Duration,
    initial_pool_size: u64,
    reporting_interval: Duration,
    report_storage: bool,
    storage_interval: Duration,
    seed: Option<u64>,
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rates(&self) -> OperationRates {
        self.rates
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn initial_pool_size(&self) -> u64 {
        self.initial_pool_size
    }

    pub fn reporting_interval(&self) -> Duration {
        self.reporting_interval
    }

    pub fn report_storage(&self) -> bool {
        self.report_storage
    }

    pub fn storage_interval(&self) -> Duration {
        self.storage_interval
    }

    /// Seed for the per-worker rngs, `None` seeds from the OS.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

/// Accumulates the fields of a [`RunConfig`].
///
/// Numeric setters accept signed values so that
/// out of range input is reported by [`RunConfigBuilder::build`]
/// instead of being truncated on the way in.
#[derive(Debug, Clone, Default)]
pub struct RunConfigBuilder {
    name: Option<String>,
    create_rate: i64,
    read_rate: i64,
    update_rate: i64,
    delete_rate: i64,
    ping_rate: i64,
    num_workers: i64,
    max_duration_ms: i64,
    initial_pool_size: i64,
    reporting_interval_ms: i64,
    report_storage: bool,
    storage_interval_ms: i64,
    seed: Option<u64>,
}

macro_rules! builder_setters {
    ($($(#[$doc:meta])* $field:ident: $ty:ty),+ $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $field(mut self, value: $ty) -> Self {
                self.$field = value;
                self
            }
        )+
    };
}

impl RunConfigBuilder {
    builder_setters! {
        create_rate: i64,
        read_rate: i64,
        update_rate: i64,
        delete_rate: i64,
        ping_rate: i64,
        num_workers: i64,
        /// Length of the timed window, in milliseconds.
        max_duration_ms: i64,
        /// Records created before the timed window starts.
        initial_pool_size: i64,
        reporting_interval_ms: i64,
        report_storage: bool,
        storage_interval_ms: i64,
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn rates(self, rates: OperationRates) -> Self {
        self.create_rate(rates.create.into())
            .read_rate(rates.read.into())
            .update_rate(rates.update.into())
            .delete_rate(rates.delete.into())
            .ping_rate(rates.ping.into())
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(&self) -> Result<RunConfig, ConfigurationError> {
        for (field, value) in [
            ("create rate", self.create_rate),
            ("read rate", self.read_rate),
            ("update rate", self.update_rate),
            ("delete rate", self.delete_rate),
            ("ping rate", self.ping_rate),
            ("number of workers", self.num_workers),
            ("max duration", self.max_duration_ms),
            ("initial pool size", self.initial_pool_size),
            ("reporting interval", self.reporting_interval_ms),
            ("storage interval", self.storage_interval_ms),
        ] {
            if value < 0 {
                return Err(ConfigurationError::NegativeValue { field, value });
            }
        }

        let mut rates = [0u32; 5];
        for (rate, (field, value)) in rates.iter_mut().zip([
            ("create rate", self.create_rate),
            ("read rate", self.read_rate),
            ("update rate", self.update_rate),
            ("delete rate", self.delete_rate),
            ("ping rate", self.ping_rate),
        ]) {
            *rate = u32::try_from(value)
                .ok()
                .filter(|rate| *rate <= 100)
                .ok_or(ConfigurationError::RateOutOfRange { field, value })?;
        }

        let rates = OperationRates::new(rates[0], rates[1], rates[2], rates[3], rates[4]);
        let rate_sum = rates.total();
        if rate_sum != 100 {
            return Err(ConfigurationError::RateSum(rate_sum as i64));
        }

        if self.reporting_interval_ms == 0 {
            return Err(ConfigurationError::ZeroReportingInterval);
        }

        if self.report_storage && self.storage_interval_ms == 0 {
            return Err(ConfigurationError::ZeroStorageInterval);
        }

        let name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => return Err(ConfigurationError::EmptyName),
        };

        if self.initial_pool_size == 0 {
            if let Some(op) = Operation::ALL
                .into_iter()
                .find(|op| op.targets_existing_record() && rates.get(*op) > 0)
            {
                return Err(ConfigurationError::EmptyPool(op));
            }
        }

        Ok(RunConfig {
            name,
            rates,
            num_workers: self.num_workers as usize,
            max_duration: Duration::from_millis(self.max_duration_ms as u64),
            initial_pool_size: self.initial_pool_size as u64,
            reporting_interval: Duration::from_millis(self.reporting_interval_ms as u64),
            report_storage: self.report_storage,
            storage_interval: Duration::from_millis(self.storage_interval_ms as u64),
            seed: self.seed,
        })
    }
}

/// Reason a [`RunConfig`] could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    NegativeValue { field: &'static str, value: i64 },
    RateOutOfRange { field: &'static str, value: i64 },
    RateSum(i64),
    ZeroReportingInterval,
    ZeroStorageInterval,
    EmptyName,
    EmptyPool(Operation),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::NegativeValue { field, value } => write!(
                f,
                "ConfigurationError: {field} must be zero or positive (got {value})"
            ),
            ConfigurationError::RateOutOfRange { field, value } => write!(
                f,
                "ConfigurationError: {field} must be in the range [0, 100] (got {value})"
            ),
            ConfigurationError::RateSum(sum) => write!(
                f,
                "ConfigurationError: operation rates must add up to exactly 100 (got {sum})"
            ),
            ConfigurationError::ZeroReportingInterval => write!(
                f,
                "ConfigurationError: reporting interval must be greater than zero"
            ),
            ConfigurationError::ZeroStorageInterval => write!(
                f,
                "ConfigurationError: storage reporting interval must be greater than zero"
            ),
            ConfigurationError::EmptyName => {
                write!(f, "ConfigurationError: run name must not be empty")
            }
            ConfigurationError::EmptyPool(op) => write!(
                f,
                "ConfigurationError: {op} rate is set, the initial pool size must be greater than zero"
            ),
        }
    }
}

impl std::error::Error for ConfigurationError {}
