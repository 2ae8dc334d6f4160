//! Health reports and trend results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Report severity, ordered. `escalate` only ever moves it upward within
/// one health evaluation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Closed set of issue categories a health check can raise.
///
/// The patch synthesizer dispatches on this tag, so detection and
/// remediation stay decoupled from issue message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Average phi over the recent window fell below the floor.
    PhiDegraded,
    /// Latest phi is within 10% above the floor.
    PhiDeclining,
    /// Basin drift exceeded the maximum.
    BasinDrift,
    /// Basin drift exceeded 70% of the maximum.
    BasinDrifting,
    /// Too many breakdown regimes in the recent window.
    RegimeInstability,
    /// Error rate above threshold.
    ErrorRate,
    /// Average latency above threshold.
    Latency,
}

/// One detected issue: category tag, the measured value that tripped it,
/// and a human-readable message for logs and review requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub value: f64,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, value: f64, message: impl Into<String>) -> Self {
        Self {
            kind,
            value,
            message: message.into(),
        }
    }
}

/// Derived health report, recomputed on every query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<Issue>,
    pub severity: Severity,
    pub metrics: BTreeMap<String, f64>,
}

impl HealthReport {
    /// Warm-up report: not enough history to assess anything.
    pub fn insufficient_data() -> Self {
        Self {
            healthy: true,
            issues: Vec::new(),
            severity: Severity::Normal,
            metrics: BTreeMap::new(),
        }
    }

    /// Raise severity, never lower it.
    pub fn escalate(&mut self, to: Severity) {
        if to > self.severity {
            self.severity = to;
        }
    }

    pub fn has_issue(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

/// Trend direction for a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
    /// Not enough history to fit a slope.
    Unknown,
}

/// Least-squares trend over a recent window of one metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendResult {
    pub direction: TrendDirection,
    pub slope: f64,
    pub recent_avg: f64,
}

impl TrendResult {
    pub fn unknown() -> Self {
        Self {
            direction: TrendDirection::Unknown,
            slope: 0.0,
            recent_avg: 0.0,
        }
    }
}
