//! Geometric health monitor.
//!
//! Ingests raw telemetry into a bounded snapshot history, keeps the
//! baseline basin fixed at the first capture, and derives health reports
//! and trend statistics on demand. The monitor is the single writer of
//! its history; health and trend queries are read-only.

use anyhow::{Context, Result};
use chrono::Utc;
use sentinel_common::{
    classify_regime, geodesic_distance, normalize_basin, HealthReport, Issue, IssueKind,
    RawState, SentinelError, Severity, Snapshot, TrendDirection, TrendResult,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::synth::BasinContext;

/// Snapshots a health evaluation looks back over.
const RECENT_WINDOW: usize = 10;

/// Default trend window.
pub const TREND_WINDOW: usize = 50;

/// Slope magnitude below which a trend counts as stable.
const TREND_EPSILON: f64 = 0.001;

/// Breakdown regimes tolerated within the recent window.
const MAX_BREAKDOWNS: usize = 3;

/// Performance thresholds.
const ERROR_RATE_MAX: f64 = 0.05;
const LATENCY_MAX_MS: f64 = 2000.0;

/// Last-known-good scalar values, used to repair missing or non-finite
/// fields in the inbound feed. Seeded with neutral cold-start defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LastGood {
    phi: f64,
    kappa_eff: f64,
    confidence: f64,
    surprise: f64,
    agency: f64,
    error_rate: f64,
    avg_latency_ms: f64,
    memory_mb: f64,
}

impl Default for LastGood {
    fn default() -> Self {
        Self {
            phi: 0.5,
            kappa_eff: 50.0,
            confidence: 0.5,
            surprise: 0.5,
            agency: 0.5,
            error_rate: 0.0,
            avg_latency_ms: 0.0,
            memory_mb: 0.0,
        }
    }
}

/// Persisted monitor state.
#[derive(Debug, Serialize, Deserialize)]
struct MonitorState {
    phi_min: f64,
    drift_max: f64,
    baseline: Option<Vec<f64>>,
    snapshots: Vec<Snapshot>,
}

/// Health monitor over a bounded snapshot history.
pub struct HealthMonitor {
    phi_min: f64,
    drift_max: f64,
    history_size: usize,
    snapshots: VecDeque<Snapshot>,
    baseline: Option<Vec<f64>>,
    code_version: String,
    last_good: LastGood,
}

impl HealthMonitor {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            phi_min: config.phi_min,
            drift_max: config.drift_max,
            history_size: config.history_size.max(1),
            snapshots: VecDeque::new(),
            baseline: None,
            code_version: "unknown".to_string(),
            last_good: LastGood::default(),
        }
    }

    /// Tag future snapshots with a code version (usually the VCS head).
    pub fn with_code_version(mut self, version: impl Into<String>) -> Self {
        self.code_version = version.into();
        self
    }

    pub fn phi_min(&self) -> f64 {
        self.phi_min
    }

    pub fn history_len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    /// Most recent snapshots, newest last.
    pub fn recent(&self, limit: usize) -> Vec<Snapshot> {
        let skip = self.snapshots.len().saturating_sub(limit);
        self.snapshots.iter().skip(skip).cloned().collect()
    }

    /// Current basin position plus the baseline, for drift remediation.
    pub fn basin_context(&self) -> Option<BasinContext> {
        let current = self.snapshots.back()?;
        let baseline = self.baseline.as_ref()?;
        Some(BasinContext {
            current: current.basin.clone(),
            baseline: baseline.clone(),
        })
    }

    /// Capture one snapshot from raw telemetry.
    ///
    /// Malformed input is repaired locally: the basin is renormalized (or
    /// replaced with the canonical unit vector), missing or non-finite
    /// scalars take the last-known-good value, and phi is clamped into
    /// [0, 1]. Appends to history, evicting the oldest snapshot when the
    /// capacity is exceeded, and fixes the baseline on first capture.
    pub fn capture(&mut self, raw: RawState) -> Snapshot {
        let phi = self.repair(raw.phi, |g| &mut g.phi).clamp(0.0, 1.0);
        self.last_good.phi = phi;

        let snapshot = Snapshot {
            timestamp: Utc::now(),
            phi,
            kappa_eff: self.repair(raw.kappa_eff, |g| &mut g.kappa_eff),
            basin: normalize_basin(&raw.basin),
            confidence: self.repair(raw.confidence, |g| &mut g.confidence),
            surprise: self.repair(raw.surprise, |g| &mut g.surprise),
            agency: self.repair(raw.agency, |g| &mut g.agency),
            regime: classify_regime(phi),
            error_rate: self.repair(raw.error_rate, |g| &mut g.error_rate),
            avg_latency_ms: self.repair(raw.avg_latency_ms, |g| &mut g.avg_latency_ms),
            memory_mb: self.repair(raw.memory_mb, |g| &mut g.memory_mb),
            code_version: self.code_version.clone(),
            source_module: if raw.source_module.is_empty() {
                "unknown".to_string()
            } else {
                raw.source_module
            },
        };

        self.snapshots.push_back(snapshot.clone());
        while self.snapshots.len() > self.history_size {
            self.snapshots.pop_front();
        }

        // Baseline is the basin of the first capture, copied, and stays
        // fixed until reset or reload.
        if self.baseline.is_none() {
            self.baseline = Some(snapshot.basin.clone());
            debug!("Baseline basin fixed from first snapshot");
        }

        snapshot
    }

    fn repair(&mut self, value: Option<f64>, slot: impl Fn(&mut LastGood) -> &mut f64) -> f64 {
        match value {
            Some(v) if v.is_finite() => {
                *slot(&mut self.last_good) = v;
                v
            }
            _ => *slot(&mut self.last_good),
        }
    }

    /// Evaluate current health over the most recent snapshots.
    ///
    /// Below the warm-up count the report is unconditionally healthy:
    /// there is not enough data to assess anything. Severity is monotone
    /// non-decreasing across the four rules within one evaluation.
    pub fn check_health(&self) -> HealthReport {
        if self.snapshots.len() < RECENT_WINDOW {
            return HealthReport::insufficient_data();
        }

        let recent: Vec<&Snapshot> = self
            .snapshots
            .iter()
            .skip(self.snapshots.len() - RECENT_WINDOW)
            .collect();
        let current = recent[recent.len() - 1];

        let mut report = HealthReport::default();

        // 1. Integration floor
        let avg_phi = recent.iter().map(|s| s.phi).sum::<f64>() / recent.len() as f64;
        if avg_phi < self.phi_min {
            report.issues.push(Issue::new(
                IssueKind::PhiDegraded,
                avg_phi,
                format!("phi degraded: {:.3} < {:.3}", avg_phi, self.phi_min),
            ));
            report.escalate(Severity::Critical);
        } else if current.phi < self.phi_min * 1.1 {
            report.issues.push(Issue::new(
                IssueKind::PhiDeclining,
                current.phi,
                format!("phi declining: {:.3}", current.phi),
            ));
            report.escalate(Severity::Warning);
        }

        // 2. Basin drift from baseline
        let drift = self
            .baseline
            .as_ref()
            .map(|b| geodesic_distance(&current.basin, b))
            .unwrap_or(0.0);
        if drift > self.drift_max {
            report.issues.push(Issue::new(
                IssueKind::BasinDrift,
                drift,
                format!("basin drift: {:.3} > {:.3}", drift, self.drift_max),
            ));
            report.escalate(Severity::Critical);
        } else if drift > self.drift_max * 0.7 {
            report.issues.push(Issue::new(
                IssueKind::BasinDrifting,
                drift,
                format!("basin drifting: {:.3}", drift),
            ));
            report.escalate(Severity::Warning);
        }

        // 3. Regime stability
        let breakdown_count = recent
            .iter()
            .filter(|s| s.regime == sentinel_common::Regime::Breakdown)
            .count();
        if breakdown_count > MAX_BREAKDOWNS {
            report.issues.push(Issue::new(
                IssueKind::RegimeInstability,
                breakdown_count as f64,
                format!("frequent breakdowns: {}/{}", breakdown_count, RECENT_WINDOW),
            ));
            report.escalate(Severity::Critical);
        }

        // 4. Performance
        if current.error_rate > ERROR_RATE_MAX {
            report.issues.push(Issue::new(
                IssueKind::ErrorRate,
                current.error_rate,
                format!("high error rate: {:.1}%", current.error_rate * 100.0),
            ));
            report.escalate(Severity::Critical);
        }
        if current.avg_latency_ms > LATENCY_MAX_MS {
            report.issues.push(Issue::new(
                IssueKind::Latency,
                current.avg_latency_ms,
                format!("high latency: {:.0}ms", current.avg_latency_ms),
            ));
            report.escalate(Severity::Warning);
        }

        report.healthy = report.issues.is_empty();
        report.metrics.insert("phi".into(), current.phi);
        report.metrics.insert("basin_drift".into(), drift);
        report
            .metrics
            .insert("breakdown_count".into(), breakdown_count as f64);
        report
            .metrics
            .insert("error_rate".into(), current.error_rate);
        report
            .metrics
            .insert("latency_ms".into(), current.avg_latency_ms);

        report
    }

    /// Least-squares trend of one metric over the last `window` snapshots.
    ///
    /// Known metrics: `phi`, `basin_drift`, `latency`, `errors`. An
    /// unknown name is a caller error and surfaces as
    /// [`SentinelError::UnknownMetric`]; insufficient history is not an
    /// error and yields an unknown trend.
    pub fn get_trend(&self, metric: &str, window: usize) -> Result<TrendResult, SentinelError> {
        let values = self.metric_values(metric, window)?;
        let values = match values {
            Some(v) => v,
            None => return Ok(TrendResult::unknown()),
        };

        let slope = ols_slope(&values);
        let recent_avg = values.iter().sum::<f64>() / values.len() as f64;

        // phi is higher-is-better; the rest invert the sign convention.
        let higher_is_better = metric == "phi";
        let direction = if slope.abs() <= TREND_EPSILON {
            TrendDirection::Stable
        } else if (slope > 0.0) == higher_is_better {
            TrendDirection::Improving
        } else {
            TrendDirection::Degrading
        };

        Ok(TrendResult {
            direction,
            slope,
            recent_avg,
        })
    }

    fn metric_values(
        &self,
        metric: &str,
        window: usize,
    ) -> Result<Option<Vec<f64>>, SentinelError> {
        // Validate the metric name before the history-length check so a
        // typo always surfaces, even on an empty monitor.
        if !matches!(metric, "phi" | "basin_drift" | "latency" | "errors") {
            return Err(SentinelError::UnknownMetric(metric.to_string()));
        }

        if self.snapshots.len() < window {
            return Ok(None);
        }

        let recent = self.snapshots.iter().skip(self.snapshots.len() - window);
        let values = match metric {
            "phi" => recent.map(|s| s.phi).collect(),
            "basin_drift" => {
                let baseline = match &self.baseline {
                    Some(b) => b,
                    None => return Ok(None),
                };
                recent
                    .map(|s| geodesic_distance(&s.basin, baseline))
                    .collect()
            }
            "latency" => recent.map(|s| s.avg_latency_ms).collect(),
            "errors" => recent.map(|s| s.error_rate).collect(),
            _ => unreachable!(),
        };
        Ok(Some(values))
    }

    /// Persist thresholds, baseline and full history as JSON.
    ///
    /// A save failure is the one storage error that propagates: losing
    /// history silently would defeat the audit trail.
    pub fn save(&self, path: &Path) -> Result<()> {
        let state = MonitorState {
            phi_min: self.phi_min,
            drift_max: self.drift_max,
            baseline: self.baseline.clone(),
            snapshots: self.snapshots.iter().cloned().collect(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&state)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to save monitor state to {}", path.display()))?;

        debug!("Saved {} snapshots to {}", self.snapshots.len(), path.display());
        Ok(())
    }

    /// Replace in-memory state with a previously saved record (no merge).
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read monitor state from {}", path.display()))?;
        let state: MonitorState = serde_json::from_str(&content)
            .with_context(|| format!("Malformed monitor state in {}", path.display()))?;

        self.phi_min = state.phi_min;
        self.drift_max = state.drift_max;
        self.baseline = state.baseline;
        self.snapshots = state.snapshots.into();

        info!(
            "Loaded {} snapshots from {}",
            self.snapshots.len(),
            path.display()
        );
        Ok(())
    }
}

/// Ordinary least-squares slope of `values` against their index.
fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }

    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }

    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
