//! Fitness estimation for healing patches.
//!
//! The estimator assigns an expected-benefit score in [0, 1] used to gate
//! automatic application. The trait is the extension point: the shipped
//! implementation is a fixed per-category table, standing in for a future
//! sandboxed before/after geometric measurement that can replace it
//! without touching any caller.

use sentinel_common::{HealingPatch, PatchKind};

/// Scores a patch draft. Implementations must be deterministic for a
/// given patch category and return a value in [0, 1].
pub trait FitnessEstimator: Send + Sync {
    fn estimate(&self, patch: &HealingPatch) -> f64;
}

/// Fixed per-category scores. Integration and error-containment patches
/// have historically been safe; basin corrections carry medium risk and
/// performance patches are the most variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticFitness;

impl FitnessEstimator for StaticFitness {
    fn estimate(&self, patch: &HealingPatch) -> f64 {
        match patch.kind {
            PatchKind::PhiRestoration => 0.75,
            PatchKind::BasinCorrection => 0.65,
            PatchKind::LatencyOptimization => 0.60,
            PatchKind::ErrorHandling => 0.70,
        }
    }
}
