//! Basin Sentinel daemon.
//!
//! Samples a process's geometric state, tracks health and trends, and when
//! degradation is detected synthesizes a remediation patch, scores it, and
//! applies it through a branch-and-test workflow with rollback and a
//! human-review fallback.

pub mod apply;
pub mod config;
pub mod fitness;
pub mod healer;
pub mod monitor;
pub mod repo;
pub mod runtime;
pub mod synth;

pub use apply::{ApplyOutcome, PatchApplier};
pub use config::SentinelConfig;
pub use fitness::{FitnessEstimator, StaticFitness};
pub use healer::{HealOutcome, HealingEngine};
pub use monitor::HealthMonitor;
pub use repo::{GitRepo, RepoCommands};
pub use runtime::{PatchLog, ProcessStateFeed, SentinelHandle, SentinelRuntime, StateFeed};
pub use synth::{synthesize_patch, BasinContext};
