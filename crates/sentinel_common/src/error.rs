//! Error types for Basin Sentinel.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    /// A trend metric name that the monitor does not track. This is a
    /// programmer error on the caller's side, not runtime degradation.
    /// Repository and persistence failures stay as `anyhow` errors at
    /// their call sites; this is the one fault callers match on.
    #[error("Unknown trend metric: {0} (expected phi, basin_drift, latency or errors)")]
    UnknownMetric(String),
}
