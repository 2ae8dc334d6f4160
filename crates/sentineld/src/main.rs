//! Basin Sentinel daemon entry point.
//!
//! Wires the monitor, healing engine and periodic loops together, runs
//! until interrupted, and persists state on the way down.

use anyhow::Result;
use sentinel_common::RawState;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sentineld::apply::PatchApplier;
use sentineld::config::{SentinelConfig, CONFIG_PATH};
use sentineld::fitness::StaticFitness;
use sentineld::healer::HealingEngine;
use sentineld::monitor::HealthMonitor;
use sentineld::repo::{GitRepo, RepoCommands};
use sentineld::runtime::{ProcessStateFeed, SentinelRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Basin Sentinel v{} starting", env!("CARGO_PKG_VERSION"));

    let config = SentinelConfig::load(Path::new(CONFIG_PATH))?;

    let repo: Arc<dyn RepoCommands> = Arc::new(GitRepo::new(
        config.repo.root.clone(),
        config.repo.test_command.clone(),
        Duration::from_secs(config.repo.test_timeout_secs),
    ));

    let mut monitor =
        HealthMonitor::new(&config.monitor).with_code_version(repo.head_version());

    // Warm start from persisted history when present.
    let monitor_state = config.monitor_state_path();
    if monitor_state.exists() {
        monitor.load(&monitor_state)?;
    }

    let monitor = Arc::new(RwLock::new(monitor));

    let applier = PatchApplier::new(Arc::clone(&repo));
    let mut healer = HealingEngine::new(
        Arc::clone(&monitor),
        Box::new(StaticFitness),
        applier,
        &config.healer,
    );

    let healer_state = config.healer_state_path();
    if healer_state.exists() {
        healer.load(&healer_state)?;
    }

    let mut runtime = SentinelRuntime::new(Arc::clone(&monitor), healer, &config);
    let handle = runtime.handle();

    // Without an embedding process wired in, the feed reports only what
    // the OS can tell us about ourselves; geometric scalars fall back to
    // last-known-good values inside the monitor.
    runtime.start(Box::new(ProcessStateFeed::new(RawState::default)));

    info!("Basin Sentinel running");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");

    runtime.stop().await;

    // Persist monitor and healer state. A save failure here is the one
    // storage error treated as fatal.
    monitor.read().await.save(&monitor_state)?;
    let patches = handle.list_patches().await;
    info!(
        "Shutdown: {} patches generated, {} applied this run",
        patches.generated.len(),
        patches.applied.len()
    );
    if let Err(e) = handle.save_healer(&healer_state).await {
        warn!("Failed to persist healer state: {:#}", e);
        return Err(e);
    }

    Ok(())
}
