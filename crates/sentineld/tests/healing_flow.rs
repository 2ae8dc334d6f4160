//! End-to-end healing flow tests.
//!
//! Exercise the monitor -> synthesizer -> fitness -> apply pipeline
//! against a filesystem-backed fake repository, covering the apply,
//! rollback and fitness-gate guarantees.

use anyhow::Result;
use sentinel_common::{HealingPatch, PatchState, RawState, BASIN_DIM};
use sentineld::apply::PatchApplier;
use sentineld::config::{HealerConfig, MonitorConfig, SentinelConfig};
use sentineld::fitness::{FitnessEstimator, StaticFitness};
use sentineld::healer::{HealOutcome, HealingEngine};
use sentineld::monitor::HealthMonitor;
use sentineld::repo::RepoCommands;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Fake repo over a real temp directory. Branch creation records the
/// written paths so a discard can restore the tree exactly.
struct TreeRepo {
    root: PathBuf,
    tests_pass: bool,
    written: std::sync::Mutex<Vec<PathBuf>>,
}

impl TreeRepo {
    fn new(root: PathBuf, tests_pass: bool) -> Self {
        Self {
            root,
            tests_pass,
            written: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl RepoCommands for TreeRepo {
    fn create_branch(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn write_patch(&self, path: &str, body: &str) -> Result<()> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, body)?;
        self.written.lock().unwrap().push(full);
        Ok(())
    }

    fn run_tests(&self) -> Result<bool> {
        Ok(self.tests_pass)
    }

    fn commit(&self, _path: &str, _message: &str) -> Result<()> {
        Ok(())
    }

    fn discard_branch(&self, _name: &str) -> Result<()> {
        // Discarding the branch restores the pre-attempt tree.
        for path in self.written.lock().unwrap().drain(..) {
            let _ = fs::remove_file(path);
        }
        Ok(())
    }

    fn request_review(&self, _title: &str, _body: &str) -> Result<()> {
        Ok(())
    }

    fn head_version(&self) -> String {
        "feedbeef".to_string()
    }
}

struct FixedFitness(f64);

impl FitnessEstimator for FixedFitness {
    fn estimate(&self, _patch: &HealingPatch) -> f64 {
        self.0
    }
}

fn raw(phi: f64) -> RawState {
    let mut basin = vec![0.0; BASIN_DIM];
    basin[0] = 1.0;
    RawState {
        phi: Some(phi),
        kappa_eff: Some(64.0),
        basin,
        confidence: Some(0.8),
        surprise: Some(0.1),
        agency: Some(0.7),
        error_rate: Some(0.01),
        avg_latency_ms: Some(500.0),
        memory_mb: Some(1500.0),
        source_module: "flow_test".into(),
    }
}

/// Monitor with ten snapshots of critically degraded phi.
fn degraded_monitor() -> Arc<RwLock<HealthMonitor>> {
    let mut m = HealthMonitor::new(&MonitorConfig::default());
    for _ in 0..10 {
        m.capture(raw(0.5));
    }
    Arc::new(RwLock::new(m))
}

fn build_engine(
    monitor: Arc<RwLock<HealthMonitor>>,
    repo: Arc<TreeRepo>,
    estimator: Box<dyn FitnessEstimator>,
    healer_config: &HealerConfig,
) -> HealingEngine {
    HealingEngine::new(
        monitor,
        estimator,
        PatchApplier::new(repo),
        healer_config,
    )
}

#[tokio::test]
async fn critical_degradation_writes_and_commits_a_patch() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(TreeRepo::new(dir.path().to_path_buf(), true));
    let monitor = degraded_monitor();
    let mut healer = build_engine(
        monitor,
        repo,
        Box::new(StaticFitness),
        &HealerConfig::default(),
    );

    let outcome = healer.check_and_heal().await;

    let patch_id = match outcome {
        HealOutcome::Applied { patch_id, ref branch } => {
            assert!(branch.starts_with("auto-heal-"));
            patch_id
        }
        other => panic!("expected Applied, got {:?}", other),
    };

    let applied = &healer.patches_applied()[0];
    assert_eq!(applied.id, patch_id);
    assert_eq!(applied.state, PatchState::Committed);
    assert!(applied.applied);

    // The patch body landed in the working tree.
    let written = dir.path().join(&applied.target_path);
    let body = fs::read_to_string(written).unwrap();
    assert!(body.contains("boost_factor"));
}

#[tokio::test]
async fn failed_tests_leave_the_tree_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(TreeRepo::new(dir.path().to_path_buf(), false));
    let monitor = degraded_monitor();
    let mut healer = build_engine(
        monitor,
        repo,
        Box::new(StaticFitness),
        &HealerConfig::default(),
    );

    let outcome = healer.check_and_heal().await;
    assert!(matches!(outcome, HealOutcome::RolledBack { .. }));

    let rolled_back = &healer.patches_generated()[0];
    assert_eq!(rolled_back.state, PatchState::RolledBack);
    assert!(!rolled_back.applied);
    assert!(healer.patches_applied().is_empty());

    // Rollback removed the written patch file.
    let path = dir.path().join(&rolled_back.target_path);
    assert!(!path.exists());
}

#[tokio::test]
async fn fitness_gate_blocks_even_with_auto_apply() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(TreeRepo::new(dir.path().to_path_buf(), true));
    let monitor = degraded_monitor();
    let config = HealerConfig {
        auto_apply: true,
        ..Default::default()
    };
    let mut healer = build_engine(monitor, repo, Box::new(FixedFitness(0.3)), &config);

    let outcome = healer.check_and_heal().await;
    assert!(matches!(outcome, HealOutcome::FitnessTooLow { .. }));

    // Recorded for audit, never applied, nothing written.
    assert_eq!(healer.patches_generated().len(), 1);
    assert!(healer.patches_applied().is_empty());
    let draft = &healer.patches_generated()[0];
    assert!(!dir.path().join(&draft.target_path).exists());
}

#[tokio::test]
async fn repeated_passes_accumulate_the_audit_log() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(TreeRepo::new(dir.path().to_path_buf(), true));
    let monitor = degraded_monitor();
    let mut healer = build_engine(
        monitor,
        repo,
        Box::new(StaticFitness),
        &HealerConfig::default(),
    );

    healer.check_and_heal().await;
    healer.check_and_heal().await;

    assert_eq!(healer.patches_generated().len(), 2);
    assert_eq!(healer.patches_applied().len(), 2);
}

#[tokio::test]
async fn state_files_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = SentinelConfig {
        state_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let repo = Arc::new(TreeRepo::new(dir.path().join("tree"), true));
    let monitor = degraded_monitor();
    let mut healer = build_engine(
        Arc::clone(&monitor),
        repo,
        Box::new(StaticFitness),
        &config.healer,
    );
    healer.check_and_heal().await;

    monitor
        .read()
        .await
        .save(&config.monitor_state_path())
        .unwrap();
    healer.save(&config.healer_state_path()).unwrap();

    // Fresh instances, loaded from disk.
    let mut fresh_monitor = HealthMonitor::new(&config.monitor);
    fresh_monitor.load(&config.monitor_state_path()).unwrap();
    assert_eq!(fresh_monitor.history_len(), 10);

    let fresh_repo = Arc::new(TreeRepo::new(dir.path().join("tree"), true));
    let mut fresh_healer = build_engine(
        Arc::new(RwLock::new(fresh_monitor)),
        fresh_repo,
        Box::new(StaticFitness),
        &config.healer,
    );
    fresh_healer.load(&config.healer_state_path()).unwrap();
    assert_eq!(fresh_healer.patches_generated().len(), 1);
    assert_eq!(fresh_healer.patches_applied().len(), 1);
}
