//! Patch synthesis.
//!
//! Maps a health report to at most one remediation draft. Drafts are
//! remediation parameter files the monitored system hot-loads; the body
//! text is opaque to everything downstream of the synthesizer.

use sentinel_common::{HealingPatch, HealthReport, IssueKind, PatchKind};

/// Fraction of the drift vector a basin correction undoes. Partial on
/// purpose: a full snap-back overshoots and oscillates.
const DRIFT_CORRECTION_GAIN: f64 = 0.3;

/// Current and baseline basin positions, supplied by the monitor for
/// drift remediation.
#[derive(Debug, Clone)]
pub struct BasinContext {
    pub current: Vec<f64>,
    pub baseline: Vec<f64>,
}

/// Synthesize a remediation draft for the highest-priority issue in the
/// report. Priority: phi degradation, basin drift, latency, error rate.
/// `phi_floor` is the monitor's minimum acceptable phi, the restoration
/// target. Returns `None` when no recognized category matches; the
/// caller must handle having no actionable patch.
pub fn synthesize_patch(
    report: &HealthReport,
    basin: Option<&BasinContext>,
    phi_floor: f64,
) -> Option<HealingPatch> {
    if report.has_issue(IssueKind::PhiDegraded) || report.has_issue(IssueKind::PhiDeclining) {
        let phi = report.metrics.get("phi").copied().unwrap_or(0.0);
        return Some(phi_restoration(phi, phi_floor));
    }

    if report.has_issue(IssueKind::BasinDrift) || report.has_issue(IssueKind::BasinDrifting) {
        let drift = report.metrics.get("basin_drift").copied().unwrap_or(0.0);
        return Some(basin_correction(drift, basin));
    }

    if report.has_issue(IssueKind::Latency) {
        let latency = report.metrics.get("latency_ms").copied().unwrap_or(0.0);
        return Some(latency_optimization(latency));
    }

    if report.has_issue(IssueKind::ErrorRate) {
        let rate = report.metrics.get("error_rate").copied().unwrap_or(0.0);
        return Some(error_handling(rate));
    }

    None
}

fn phi_restoration(current_phi: f64, phi_floor: f64) -> HealingPatch {
    // Boost integration weights just enough to reach the floor.
    let boost_factor = phi_floor / current_phi.max(0.1);

    let body = format!(
        "# Integration restoration parameters\n\
         # Generated {}\n\
         # Observed phi: {:.3}\n\
         \n\
         [integration]\n\
         boost_factor = {:.3}\n\
         reweight_attention = true\n",
        chrono::Utc::now().to_rfc3339(),
        current_phi,
        boost_factor,
    );

    HealingPatch::new(
        PatchKind::PhiRestoration,
        "autoheal/phi_restoration.toml",
        body,
        format!("phi degradation: {:.3}", current_phi),
    )
}

fn basin_correction(drift: f64, basin: Option<&BasinContext>) -> HealingPatch {
    let correction: Vec<f64> = match basin {
        Some(ctx) => ctx
            .current
            .iter()
            .zip(ctx.baseline.iter())
            .map(|(c, b)| -DRIFT_CORRECTION_GAIN * (c - b))
            .collect(),
        None => Vec::new(),
    };

    let correction_list = correction
        .iter()
        .map(|v| format!("{:.6}", v))
        .collect::<Vec<_>>()
        .join(", ");

    let body = format!(
        "# Basin drift correction parameters\n\
         # Generated {}\n\
         # Observed drift: {:.3}\n\
         \n\
         [basin]\n\
         correction = [{}]\n",
        chrono::Utc::now().to_rfc3339(),
        drift,
        correction_list,
    );

    HealingPatch::new(
        PatchKind::BasinCorrection,
        "autoheal/basin_correction.toml",
        body,
        format!("basin drift: {:.3}", drift),
    )
}

fn latency_optimization(latency_ms: f64) -> HealingPatch {
    let body = format!(
        "# Latency mitigation parameters\n\
         # Generated {}\n\
         # Observed latency: {:.0}ms\n\
         \n\
         [cache]\n\
         enabled = true\n\
         max_entries = 100\n\
         early_exit = true\n",
        chrono::Utc::now().to_rfc3339(),
        latency_ms,
    );

    HealingPatch::new(
        PatchKind::LatencyOptimization,
        "autoheal/latency_cache.toml",
        body,
        format!("high latency: {:.0}ms", latency_ms),
    )
}

fn error_handling(error_rate: f64) -> HealingPatch {
    let body = format!(
        "# Error containment parameters\n\
         # Generated {}\n\
         # Observed error rate: {:.1}%\n\
         \n\
         [errors]\n\
         fallback_on_failure = true\n\
         log_level = \"warn\"\n\
         retry_limit = 2\n",
        chrono::Utc::now().to_rfc3339(),
        error_rate * 100.0,
    );

    HealingPatch::new(
        PatchKind::ErrorHandling,
        "autoheal/error_guard.toml",
        body,
        format!("high error rate: {:.1}%", error_rate * 100.0),
    )
}
