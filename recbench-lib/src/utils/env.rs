/// Name and version of the engine, e.g. `recbench-lib/0.1.0`.
pub const fn driver_identifier() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}

/// Default amount of workers when none is configured.
///
/// Can be overwritten using the `RECBENCH_WORKERS` env variable,
/// falls back to the available parallelism of the host.
pub fn compute_default_worker_count() -> usize {
    std::env::var("RECBENCH_WORKERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|n: &usize| *n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
}
