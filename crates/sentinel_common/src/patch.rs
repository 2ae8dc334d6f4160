//! Healing patches and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remediation category a patch belongs to.
///
/// Determines the synthesis template and the static fitness score. Closed
/// enum by design: the synthesizer and estimator dispatch on it instead of
/// scanning patch text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    PhiRestoration,
    BasinCorrection,
    LatencyOptimization,
    ErrorHandling,
}

impl PatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchKind::PhiRestoration => "phi_restoration",
            PatchKind::BasinCorrection => "basin_correction",
            PatchKind::LatencyOptimization => "latency_optimization",
            PatchKind::ErrorHandling => "error_handling",
        }
    }
}

/// Apply protocol state machine.
///
/// `Drafted -> Branched -> Written -> Tested -> Committed | RolledBack`
/// when the patch qualifies for application, `Drafted -> AwaitingReview`
/// when it is routed to a human instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchState {
    #[default]
    Drafted,
    AwaitingReview,
    Branched,
    Written,
    Tested,
    Committed,
    RolledBack,
}

/// A candidate remediation: created by the synthesizer, scored by the
/// fitness estimator, consumed by the apply controller. Immutable once
/// `applied` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingPatch {
    pub id: uuid::Uuid,
    pub kind: PatchKind,
    /// Path the patch body is written to, relative to the repo root.
    pub target_path: String,
    /// Opaque patch text.
    pub patch_body: String,
    /// Human-readable trigger description.
    pub reason: String,
    pub created_at: DateTime<Utc>,
    /// Set by the fitness estimator before any apply decision.
    pub fitness_score: Option<f64>,
    /// True only after a successful commit.
    pub applied: bool,
    pub state: PatchState,
}

impl HealingPatch {
    pub fn new(
        kind: PatchKind,
        target_path: impl Into<String>,
        patch_body: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            kind,
            target_path: target_path.into(),
            patch_body: patch_body.into(),
            reason: reason.into(),
            created_at: Utc::now(),
            fitness_score: None,
            applied: false,
            state: PatchState::Drafted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_patch_starts_drafted_and_unapplied() {
        let patch = HealingPatch::new(
            PatchKind::PhiRestoration,
            "autoheal/phi_restoration.toml",
            "boost_factor = 1.2",
            "phi degraded",
        );
        assert_eq!(patch.state, PatchState::Drafted);
        assert!(!patch.applied);
        assert!(patch.fitness_score.is_none());
    }

    #[test]
    fn patch_round_trips_through_json() {
        let patch = HealingPatch::new(
            PatchKind::BasinCorrection,
            "autoheal/basin_correction.toml",
            "correction = [0.1]",
            "basin drift 1.5",
        );
        let json = serde_json::to_string(&patch).unwrap();
        let back: HealingPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, patch.id);
        assert_eq!(back.kind, PatchKind::BasinCorrection);
        assert_eq!(back.state, PatchState::Drafted);
    }
}
