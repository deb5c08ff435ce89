mod mix;
mod scenario;
mod seconds;
mod service;
mod workload;

pub use self::{
    mix::parse_operation_mix, scenario::Scenario, seconds::parse_seconds, service::ServiceConfig,
    workload::WorkloadConfig,
};
