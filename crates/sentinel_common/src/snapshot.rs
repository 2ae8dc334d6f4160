//! Point-in-time geometric measurements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse processing regime, derived from phi at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Linear,
    Geometric,
    Breakdown,
}

/// Raw state pulled from the inbound telemetry feed.
///
/// Every scalar is optional: a missing or non-finite field is repaired by
/// the monitor with a last-known-good value at capture time, never
/// surfaced as a fault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawState {
    pub phi: Option<f64>,
    pub kappa_eff: Option<f64>,
    #[serde(default)]
    pub basin: Vec<f64>,
    pub confidence: Option<f64>,
    pub surprise: Option<f64>,
    pub agency: Option<f64>,
    pub error_rate: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub memory_mb: Option<f64>,
    #[serde(default)]
    pub source_module: String,
}

/// Immutable snapshot of system geometry at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,

    /// Integration scalar, clamped to [0, 1] at capture.
    pub phi: f64,
    /// Coupling strength.
    pub kappa_eff: f64,
    /// Unit-norm basin position (dimension `BASIN_DIM`).
    pub basin: Vec<f64>,

    // Diagnostic scalars
    pub confidence: f64,
    pub surprise: f64,
    pub agency: f64,

    /// Regime derived from phi.
    pub regime: Regime,

    // Performance scalars
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub memory_mb: f64,

    // Provenance
    pub code_version: String,
    pub source_module: String,
}
