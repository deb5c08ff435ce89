#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod config;
pub mod connector;
pub mod dispatcher;
pub mod identifiers;
pub mod metrics;
pub mod orchestrator;
pub mod sampler;
pub mod suite;
pub mod utils;
pub mod worker;

#[cfg(test)]
pub(crate) mod test;
