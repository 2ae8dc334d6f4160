//! Periodic monitoring and healing loops.
//!
//! Two long-running tasks share the monitor/healer state: the monitor
//! task samples the telemetry feed and captures snapshots on a fixed
//! period, the healing task runs `check_and_heal` on its own period.
//! Both observe the shutdown signal only at their sleep boundary, so a
//! capture or an apply sequence always finishes before cancellation.

use anyhow::Result;
use sentinel_common::{HealingPatch, HealthReport, RawState, Regime, Snapshot, TrendResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SentinelConfig;
use crate::healer::{HealOutcome, HealingEngine};
use crate::monitor::{HealthMonitor, TREND_WINDOW};

/// Inbound telemetry source the monitor task polls each period.
pub trait StateFeed: Send {
    fn sample(&mut self) -> Result<RawState>;
}

/// Feed that wraps a caller-supplied source of geometric state and fills
/// in process memory from the OS when the source leaves it unset.
pub struct ProcessStateFeed {
    source: Box<dyn FnMut() -> RawState + Send>,
    system: System,
    pid: Option<Pid>,
}

impl ProcessStateFeed {
    pub fn new(source: impl FnMut() -> RawState + Send + 'static) -> Self {
        Self {
            source: Box::new(source),
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl StateFeed for ProcessStateFeed {
    fn sample(&mut self) -> Result<RawState> {
        let mut raw = (self.source)();

        if raw.memory_mb.is_none() {
            if let Some(pid) = self.pid {
                self.system.refresh_process(pid);
                if let Some(process) = self.system.process(pid) {
                    raw.memory_mb = Some(process.memory() as f64 / (1024.0 * 1024.0));
                }
            }
        }

        Ok(raw)
    }
}

/// Both patch logs, for the query surface.
#[derive(Debug, Clone)]
pub struct PatchLog {
    pub generated: Vec<HealingPatch>,
    pub applied: Vec<HealingPatch>,
}

/// Clone-able query/trigger surface handed to embedding layers.
#[derive(Clone)]
pub struct SentinelHandle {
    monitor: Arc<RwLock<HealthMonitor>>,
    healer: Arc<Mutex<HealingEngine>>,
}

impl SentinelHandle {
    pub async fn get_health(&self) -> HealthReport {
        self.monitor.read().await.check_health()
    }

    /// Trends for all tracked metrics over the default window.
    pub async fn get_trends(&self) -> Result<BTreeMap<String, TrendResult>> {
        let monitor = self.monitor.read().await;
        let mut trends = BTreeMap::new();
        for metric in ["phi", "basin_drift", "latency", "errors"] {
            trends.insert(metric.to_string(), monitor.get_trend(metric, TREND_WINDOW)?);
        }
        Ok(trends)
    }

    pub async fn list_recent_snapshots(&self, limit: usize) -> Vec<Snapshot> {
        self.monitor.read().await.recent(limit)
    }

    pub async fn trigger_heal(&self) -> HealOutcome {
        self.healer.lock().await.check_and_heal().await
    }

    pub async fn list_patches(&self) -> PatchLog {
        let healer = self.healer.lock().await;
        PatchLog {
            generated: healer.patches_generated().to_vec(),
            applied: healer.patches_applied().to_vec(),
        }
    }

    /// Persist the healer's policy and patch logs.
    pub async fn save_healer(&self, path: &std::path::Path) -> Result<()> {
        self.healer.lock().await.save(path)
    }
}

/// Owns the periodic tasks and their shutdown signal.
pub struct SentinelRuntime {
    monitor: Arc<RwLock<HealthMonitor>>,
    healer: Arc<Mutex<HealingEngine>>,
    monitor_interval: Duration,
    heal_interval: Duration,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SentinelRuntime {
    pub fn new(
        monitor: Arc<RwLock<HealthMonitor>>,
        healer: HealingEngine,
        config: &SentinelConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            monitor,
            healer: Arc::new(Mutex::new(healer)),
            monitor_interval: Duration::from_secs(config.monitor.interval_secs),
            heal_interval: Duration::from_secs(config.healer.interval_secs),
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn handle(&self) -> SentinelHandle {
        SentinelHandle {
            monitor: Arc::clone(&self.monitor),
            healer: Arc::clone(&self.healer),
        }
    }

    /// Spawn the monitor and healing loops. Calling start on a running
    /// runtime is a warned no-op.
    pub fn start(&mut self, mut feed: Box<dyn StateFeed>) {
        if !self.tasks.is_empty() {
            warn!("Sentinel runtime already running");
            return;
        }

        info!(
            "Starting sentinel loops (monitor {}s, healing {}s)",
            self.monitor_interval.as_secs(),
            self.heal_interval.as_secs()
        );

        // Monitor task: sample the feed, capture a snapshot, log
        // degradation. Feed errors skip the tick, never kill the loop.
        let monitor = Arc::clone(&self.monitor);
        let interval = self.monitor_interval;
        let mut shutdown_rx = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.changed() => break,
                }

                let raw = match feed.sample() {
                    Ok(raw) => raw,
                    Err(e) => {
                        error!("Telemetry sample failed: {:#}", e);
                        continue;
                    }
                };

                let (snapshot, phi_min) = {
                    let mut m = monitor.write().await;
                    let snapshot = m.capture(raw);
                    (snapshot, m.phi_min())
                };

                if snapshot.phi < phi_min || snapshot.regime == Regime::Breakdown {
                    warn!(
                        "Degradation: phi={:.3}, regime={:?}",
                        snapshot.phi, snapshot.regime
                    );
                } else {
                    debug!("Captured snapshot: phi={:.3}", snapshot.phi);
                }
            }
            info!("Monitor loop stopped");
        }));

        // Healing task. check_and_heal never returns an error; external
        // failures are already downgraded inside the engine.
        let healer = Arc::clone(&self.healer);
        let interval = self.heal_interval;
        let mut shutdown_rx = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.changed() => break,
                }

                let outcome = healer.lock().await.check_and_heal().await;
                match &outcome {
                    HealOutcome::AlreadyHealthy => debug!("Healing pass: healthy"),
                    other => info!("Healing pass: {:?}", other),
                }
            }
            info!("Healing loop stopped");
        }));
    }

    /// Signal shutdown and wait for both loops. An in-flight apply
    /// sequence completes first because the loops only observe the
    /// signal between iterations.
    pub async fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        info!("Stopping sentinel loops");
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Loop task ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::PatchApplier;
    use crate::config::SentinelConfig;
    use crate::fitness::StaticFitness;
    use crate::monitor::HealthMonitor;
    use crate::repo::RepoCommands;
    use sentinel_common::BASIN_DIM;

    struct NullRepo;

    impl RepoCommands for NullRepo {
        fn create_branch(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        fn write_patch(&self, _path: &str, _body: &str) -> Result<()> {
            Ok(())
        }
        fn run_tests(&self) -> Result<bool> {
            Ok(true)
        }
        fn commit(&self, _path: &str, _message: &str) -> Result<()> {
            Ok(())
        }
        fn discard_branch(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        fn request_review(&self, _title: &str, _body: &str) -> Result<()> {
            Ok(())
        }
        fn head_version(&self) -> String {
            "testhead".to_string()
        }
    }

    struct HealthyFeed;

    impl StateFeed for HealthyFeed {
        fn sample(&mut self) -> Result<RawState> {
            let mut basin = vec![0.0; BASIN_DIM];
            basin[0] = 1.0;
            Ok(RawState {
                phi: Some(0.5),
                kappa_eff: Some(64.0),
                basin,
                confidence: Some(0.8),
                surprise: Some(0.1),
                agency: Some(0.7),
                error_rate: Some(0.01),
                avg_latency_ms: Some(500.0),
                memory_mb: Some(1500.0),
                source_module: "test".into(),
            })
        }
    }

    fn runtime(config: &SentinelConfig) -> SentinelRuntime {
        let monitor = Arc::new(RwLock::new(HealthMonitor::new(&config.monitor)));
        let applier = PatchApplier::new(Arc::new(NullRepo));
        let healer = HealingEngine::new(
            Arc::clone(&monitor),
            Box::new(StaticFitness),
            applier,
            &config.healer,
        );
        SentinelRuntime::new(monitor, healer, config)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn loops_capture_and_stop_cleanly() {
        let mut config = SentinelConfig::default();
        config.monitor.interval_secs = 0;
        config.healer.interval_secs = 0;
        // Keep the constant-phi feed comfortably healthy.
        config.monitor.phi_min = 0.4;

        let mut rt = runtime(&config);
        let handle = rt.handle();
        rt.start(Box::new(HealthyFeed));

        tokio::time::sleep(Duration::from_millis(50)).await;
        rt.stop().await;

        assert!(!handle.list_recent_snapshots(10).await.is_empty());
        // Feed is healthy, so nothing should have been synthesized.
        assert!(handle.list_patches().await.generated.is_empty());
        assert_eq!(handle.trigger_heal().await, HealOutcome::AlreadyHealthy);
    }

    #[tokio::test]
    async fn double_start_is_a_no_op() {
        let mut config = SentinelConfig::default();
        config.monitor.interval_secs = 3600;
        config.healer.interval_secs = 3600;

        let mut rt = runtime(&config);
        rt.start(Box::new(HealthyFeed));
        let running = rt.tasks.len();
        rt.start(Box::new(HealthyFeed));
        assert_eq!(rt.tasks.len(), running);
        rt.stop().await;
    }

    #[tokio::test]
    async fn process_feed_fills_memory() {
        let mut feed = ProcessStateFeed::new(|| RawState {
            phi: Some(0.7),
            ..Default::default()
        });
        let raw = feed.sample().unwrap();
        assert_eq!(raw.phi, Some(0.7));
        // Our own process always has a resident size.
        assert!(raw.memory_mb.unwrap_or(0.0) > 0.0);
    }
}
