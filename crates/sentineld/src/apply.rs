//! Apply/rollback controller.
//!
//! Drives one patch through the branch -> write -> test -> commit
//! protocol. The working tree is a singleton resource, so apply sequences
//! are serialized behind an async mutex; everything that can go wrong in
//! an external command fails only the current attempt.

use anyhow::{Context, Result};
use chrono::Utc;
use sentinel_common::{HealingPatch, PatchState};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::repo::RepoCommands;

/// Terminal result of one apply attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Tests passed and the patch was committed on `branch`.
    Committed { branch: String },
    /// Tests failed; the branch was discarded and the tree restored.
    RolledBack,
}

pub struct PatchApplier {
    repo: Arc<dyn RepoCommands>,
    /// Branch and working-tree operations are not safe to interleave.
    apply_lock: Mutex<()>,
}

impl PatchApplier {
    pub fn new(repo: Arc<dyn RepoCommands>) -> Self {
        Self {
            repo,
            apply_lock: Mutex::new(()),
        }
    }

    /// Run the full apply protocol for one patch.
    ///
    /// On a test failure the branch is discarded, the patch is marked
    /// rolled back, and the attempt ends without error. A failure of the
    /// external commands themselves propagates after a best-effort
    /// cleanup; the orchestrator downgrades it to a logged, non-fatal
    /// failure of this one attempt.
    pub async fn apply(&self, patch: &mut HealingPatch) -> Result<ApplyOutcome> {
        let _guard = self.apply_lock.lock().await;

        let branch = format!("auto-heal-{}", Utc::now().format("%Y%m%d-%H%M%S"));

        self.repo
            .create_branch(&branch)
            .with_context(|| format!("Failed to create branch {}", branch))?;
        patch.state = PatchState::Branched;

        if let Err(e) = self.repo.write_patch(&patch.target_path, &patch.patch_body) {
            self.cleanup(&branch);
            return Err(e.context("Failed to write patch body"));
        }
        patch.state = PatchState::Written;

        let tests_passed = match self.repo.run_tests() {
            Ok(passed) => passed,
            Err(e) => {
                self.cleanup(&branch);
                return Err(e.context("Failed to run test suite"));
            }
        };
        patch.state = PatchState::Tested;

        if !tests_passed {
            info!("Tests failed for patch {}, rolling back", patch.id);
            self.cleanup(&branch);
            patch.state = PatchState::RolledBack;
            return Ok(ApplyOutcome::RolledBack);
        }

        let message = format!(
            "auto-heal: {}\n\nFitness: {:.3}\nGenerated by basin sentinel.",
            patch.reason,
            patch.fitness_score.unwrap_or(0.0),
        );
        if let Err(e) = self.repo.commit(&patch.target_path, &message) {
            self.cleanup(&branch);
            return Err(e.context("Failed to commit patch"));
        }

        patch.state = PatchState::Committed;
        patch.applied = true;
        info!("Patch {} committed on {}", patch.id, branch);

        // The commit must stay reviewable even though it already landed
        // on its branch, so a review request goes out regardless.
        self.request_review(patch);

        Ok(ApplyOutcome::Committed { branch })
    }

    /// Route a patch to human review without touching the working tree.
    pub fn defer_for_review(&self, patch: &mut HealingPatch) {
        patch.state = PatchState::AwaitingReview;
        self.request_review(patch);
    }

    fn request_review(&self, patch: &HealingPatch) {
        let title = format!("[auto-heal] {}", patch.reason);
        let body = format!(
            "## Automated healing patch\n\n\
             **Category:** {}\n\
             **Reason:** {}\n\
             **Fitness score:** {:.3}\n\
             **Generated:** {}\n\n\
             ### Patch content\n```\n{}\n```\n",
            patch.kind.as_str(),
            patch.reason,
            patch.fitness_score.unwrap_or(0.0),
            patch.created_at.to_rfc3339(),
            patch.patch_body,
        );

        if let Err(e) = self.repo.request_review(&title, &body) {
            warn!("Could not open review request: {:#}", e);
        }
    }

    fn cleanup(&self, branch: &str) {
        if let Err(e) = self.repo.discard_branch(branch) {
            warn!("Failed to discard branch {}: {:#}", branch, e);
        }
    }
}
