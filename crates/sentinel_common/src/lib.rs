//! Shared types for the Basin Sentinel self-healing system.
//!
//! Everything the daemon and any embedding layer exchange lives here:
//! geometric snapshots, health reports, trend results, healing patches,
//! and the sphere geometry helpers they depend on.

pub mod error;
pub mod geometry;
pub mod health;
pub mod patch;
pub mod snapshot;

pub use error::SentinelError;
pub use geometry::{classify_regime, geodesic_distance, normalize_basin, BASIN_DIM};
pub use health::{
    HealthReport, Issue, IssueKind, Severity, TrendDirection, TrendResult,
};
pub use patch::{HealingPatch, PatchKind, PatchState};
pub use snapshot::{RawState, Regime, Snapshot};
