//! External command interface for the target repository.
//!
//! The apply controller speaks to the working tree through `RepoCommands`
//! so the branch/test/commit/review steps stay replaceable: production
//! uses git plus a configurable test runner, tests use an in-memory fake.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Replaceable version-control and test-runner operations.
///
/// Implementations execute against a singleton working tree; callers
/// (the apply controller) are responsible for serializing access.
pub trait RepoCommands: Send + Sync {
    /// Create and switch to an isolated branch.
    fn create_branch(&self, name: &str) -> Result<()>;

    /// Write the patch body at `path` relative to the repo root.
    fn write_patch(&self, path: &str, body: &str) -> Result<()>;

    /// Run the automated test suite. `Ok(false)` means the suite ran and
    /// failed; `Err` means it could not be run at all.
    fn run_tests(&self) -> Result<bool>;

    /// Stage `path` and commit with `message`.
    fn commit(&self, path: &str, message: &str) -> Result<()>;

    /// Leave the branch and delete it, restoring the previous tree.
    fn discard_branch(&self, name: &str) -> Result<()>;

    /// Open a review request for the patch. Best effort.
    fn request_review(&self, title: &str, body: &str) -> Result<()>;

    /// Short identifier of the current head, for snapshot provenance.
    fn head_version(&self) -> String;
}

/// Git-backed implementation driving a real working tree.
pub struct GitRepo {
    root: PathBuf,
    test_command: Vec<String>,
    test_timeout: Duration,
}

impl GitRepo {
    pub fn new(
        root: impl Into<PathBuf>,
        test_command: Vec<String>,
        test_timeout: Duration,
    ) -> Self {
        Self {
            root: root.into(),
            test_command,
            test_timeout,
        }
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("Failed to launch git {}", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(())
    }
}

impl RepoCommands for GitRepo {
    fn create_branch(&self, name: &str) -> Result<()> {
        self.git(&["checkout", "-b", name])
    }

    fn write_patch(&self, path: &str, body: &str) -> Result<()> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&full, body)
            .with_context(|| format!("Failed to write patch to {}", full.display()))
    }

    fn run_tests(&self) -> Result<bool> {
        let (program, args) = self
            .test_command
            .split_first()
            .context("Test command is empty")?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to launch test command {}", program))?;

        // The apply sequence holds a global lock while tests run, so a
        // hung suite must be killed, not waited on.
        let deadline = Instant::now() + self.test_timeout;
        loop {
            match child.try_wait().context("Failed to poll test command")? {
                Some(status) => return Ok(status.success()),
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    bail!(
                        "Test command timed out after {}s",
                        self.test_timeout.as_secs()
                    );
                }
                None => std::thread::sleep(Duration::from_millis(100)),
            }
        }
    }

    fn commit(&self, path: &str, message: &str) -> Result<()> {
        self.git(&["add", path])?;
        self.git(&["commit", "-m", message])
    }

    fn discard_branch(&self, name: &str) -> Result<()> {
        self.git(&["checkout", "-"])?;
        self.git(&["branch", "-D", name])
    }

    fn request_review(&self, title: &str, body: &str) -> Result<()> {
        // gh may be absent; the caller treats this as best effort.
        let output = Command::new("gh")
            .args([
                "pr",
                "create",
                "--title",
                title,
                "--body",
                body,
                "--label",
                "auto-generated,self-healing",
            ])
            .current_dir(&self.root)
            .output()
            .context("Failed to launch gh")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("gh pr create failed: {}", stderr.trim());
        }
        Ok(())
    }

    fn head_version(&self) -> String {
        detect_head_version(&self.root)
    }
}

/// Short git head hash of `root`, "unknown" when git is unavailable.
pub fn detect_head_version(root: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .current_dir(root)
        .output();

    match output {
        Ok(out) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).trim().to_string()
        }
        _ => {
            warn!("Could not resolve git head in {}", root.display());
            "unknown".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(test_command: Vec<&str>, timeout: Duration) -> (tempfile::TempDir, GitRepo) {
        let dir = tempfile::tempdir().unwrap();
        let repo = GitRepo::new(
            dir.path(),
            test_command.into_iter().map(String::from).collect(),
            timeout,
        );
        (dir, repo)
    }

    #[test]
    fn passing_test_command_reports_success() {
        let (_dir, repo) = repo(vec!["true"], Duration::from_secs(10));
        assert!(repo.run_tests().unwrap());
    }

    #[test]
    fn failing_test_command_reports_failure() {
        let (_dir, repo) = repo(vec!["false"], Duration::from_secs(10));
        assert!(!repo.run_tests().unwrap());
    }

    #[test]
    fn hung_test_command_is_killed_at_the_deadline() {
        let (_dir, repo) = repo(vec!["sleep", "30"], Duration::from_millis(300));
        let err = repo.run_tests().unwrap_err();
        assert!(format!("{:#}", err).contains("timed out"));
    }

    #[test]
    fn empty_test_command_is_an_error() {
        let (_dir, repo) = repo(vec![], Duration::from_secs(10));
        assert!(repo.run_tests().is_err());
    }
}
