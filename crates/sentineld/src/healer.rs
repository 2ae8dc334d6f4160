//! Healing orchestrator.
//!
//! Ties the monitor, synthesizer, fitness estimator and apply controller
//! into one decision per pass: heal, defer to review, or stand down.
//! Every synthesized draft is recorded for audit; only committed patches
//! make it into the applied list.

use anyhow::{Context, Result};
use sentinel_common::{HealingPatch, Severity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::apply::{ApplyOutcome, PatchApplier};
use crate::config::HealerConfig;
use crate::fitness::FitnessEstimator;
use crate::monitor::HealthMonitor;
use crate::synth::synthesize_patch;

/// Result of one healing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealOutcome {
    /// Monitor reported healthy; nothing to do.
    AlreadyHealthy,
    /// Degraded, but no issue category maps to a remediation.
    NoActionablePatch,
    /// Draft recorded for audit but below the fitness gate.
    FitnessTooLow { patch_id: Uuid },
    /// Draft routed to human review (auto-apply off, not critical).
    AwaitingReview { patch_id: Uuid },
    /// Patch committed.
    Applied { patch_id: Uuid, branch: String },
    /// Tests failed; patch rolled back.
    RolledBack { patch_id: Uuid },
    /// External commands failed; the attempt was abandoned.
    ApplyFailed { patch_id: Uuid },
}

/// Persisted healer state.
#[derive(Debug, Serialize, Deserialize)]
struct HealerState {
    fitness_threshold: f64,
    auto_apply: bool,
    patches_generated: Vec<HealingPatch>,
    patches_applied: Vec<HealingPatch>,
}

pub struct HealingEngine {
    monitor: Arc<RwLock<HealthMonitor>>,
    estimator: Box<dyn FitnessEstimator>,
    applier: PatchApplier,
    fitness_threshold: f64,
    auto_apply: bool,
    patches_generated: Vec<HealingPatch>,
    patches_applied: Vec<HealingPatch>,
}

impl HealingEngine {
    pub fn new(
        monitor: Arc<RwLock<HealthMonitor>>,
        estimator: Box<dyn FitnessEstimator>,
        applier: PatchApplier,
        config: &HealerConfig,
    ) -> Self {
        Self {
            monitor,
            estimator,
            applier,
            fitness_threshold: config.fitness_threshold,
            auto_apply: config.auto_apply,
            patches_generated: Vec::new(),
            patches_applied: Vec::new(),
        }
    }

    pub fn patches_generated(&self) -> &[HealingPatch] {
        &self.patches_generated
    }

    pub fn patches_applied(&self) -> &[HealingPatch] {
        &self.patches_applied
    }

    /// One healing pass: check health, synthesize, score, then apply or
    /// defer. Never panics or escalates an external failure; the caller
    /// loop runs again next period regardless of outcome.
    pub async fn check_and_heal(&mut self) -> HealOutcome {
        let (report, basin_ctx, phi_floor) = {
            let monitor = self.monitor.read().await;
            (
                monitor.check_health(),
                monitor.basin_context(),
                monitor.phi_min(),
            )
        };

        if report.healthy {
            return HealOutcome::AlreadyHealthy;
        }

        warn!(
            severity = report.severity.as_str(),
            issues = report.issues.len(),
            "Degradation detected"
        );
        for issue in &report.issues {
            warn!("  {}", issue.message);
        }

        let mut patch = match synthesize_patch(&report, basin_ctx.as_ref(), phi_floor) {
            Some(p) => p,
            None => {
                info!("No remediation maps to the detected issues");
                return HealOutcome::NoActionablePatch;
            }
        };

        let fitness = self.estimator.estimate(&patch);
        patch.fitness_score = Some(fitness);

        let outcome = if fitness < self.fitness_threshold {
            info!(
                "Patch {} fitness {:.3} below threshold {:.3}, not applying",
                patch.id, fitness, self.fitness_threshold
            );
            HealOutcome::FitnessTooLow { patch_id: patch.id }
        } else if self.auto_apply || report.severity == Severity::Critical {
            match self.applier.apply(&mut patch).await {
                Ok(ApplyOutcome::Committed { branch }) => HealOutcome::Applied {
                    patch_id: patch.id,
                    branch,
                },
                Ok(ApplyOutcome::RolledBack) => HealOutcome::RolledBack { patch_id: patch.id },
                Err(e) => {
                    error!("Apply attempt for patch {} failed: {:#}", patch.id, e);
                    HealOutcome::ApplyFailed { patch_id: patch.id }
                }
            }
        } else {
            info!("Patch {} awaiting manual approval", patch.id);
            self.applier.defer_for_review(&mut patch);
            HealOutcome::AwaitingReview { patch_id: patch.id }
        };

        if patch.applied {
            self.patches_applied.push(patch.clone());
        }
        self.patches_generated.push(patch);

        outcome
    }

    /// Persist policy and both patch logs as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let state = HealerState {
            fitness_threshold: self.fitness_threshold,
            auto_apply: self.auto_apply,
            patches_generated: self.patches_generated.clone(),
            patches_applied: self.patches_applied.clone(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&state)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to save healer state to {}", path.display()))
    }

    /// Replace policy and patch logs with a previously saved record.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read healer state from {}", path.display()))?;
        let state: HealerState = serde_json::from_str(&content)
            .with_context(|| format!("Malformed healer state in {}", path.display()))?;

        self.fitness_threshold = state.fitness_threshold;
        self.auto_apply = state.auto_apply;
        self.patches_generated = state.patches_generated;
        self.patches_applied = state.patches_applied;

        info!(
            "Loaded healer state: {} generated, {} applied",
            self.patches_generated.len(),
            self.patches_applied.len()
        );
        Ok(())
    }
}
