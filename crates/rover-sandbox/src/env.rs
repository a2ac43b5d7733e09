//! Per-patch dependency environment
//!
//! A virtualenv created inside the patch directory, private to that patch.
//! Environments are never shared across patches, even with identical
//! dependency lists - one patch's install failure must not contaminate
//! another patch's run.

use rover_core::{ExecutionOutcome, Result, RoverError};
use std::path::{Path, PathBuf};
use tokio::process::Command;

const ENV_DIR: &str = "env";

/// Scoped virtualenv for one patch
#[derive(Debug)]
pub struct DependencyEnv {
    root: PathBuf,
}

impl DependencyEnv {
    pub fn new(patch_dir: &Path) -> Self {
        Self {
            root: patch_dir.join(ENV_DIR),
        }
    }

    /// Interpreter inside the environment
    pub fn interpreter(&self) -> PathBuf {
        self.root.join("bin").join("python")
    }

    fn pip(&self) -> PathBuf {
        self.root.join("bin").join("pip")
    }

    /// Create the virtualenv and install the declared dependencies
    ///
    /// Installer failures are returned as an install-phase
    /// [`ExecutionOutcome`] (exit code + installer stderr), never swallowed:
    /// the repair loop must be able to tell "could not install" apart from
    /// "ran and crashed". `Err` is reserved for the sandbox itself being
    /// broken (e.g. no python on PATH).
    pub async fn provision(&self, dependencies: &[String]) -> Result<Option<ExecutionOutcome>> {
        tracing::debug!("Creating virtualenv at {}", self.root.display());
        let output = Command::new("python3")
            .args(["-m", "venv"])
            .arg(&self.root)
            .output()
            .await
            .map_err(|e| RoverError::Execution(format!("failed to run python3 -m venv: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::warn!("Virtualenv creation failed: {}", stderr);
            return Ok(Some(ExecutionOutcome::install_failure(
                format!("virtualenv creation failed: {}", stderr),
                output.status.code().unwrap_or(1),
            )));
        }

        if dependencies.is_empty() {
            return Ok(None);
        }

        tracing::info!("Installing {} dependencies", dependencies.len());
        let output = Command::new(self.pip())
            .arg("install")
            .args(dependencies)
            .output()
            .await
            .map_err(|e| RoverError::Execution(format!("failed to run pip: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::warn!("Dependency installation failed: {}", stderr);
            return Ok(Some(ExecutionOutcome::install_failure(
                stderr,
                output.status.code().unwrap_or(1),
            )));
        }

        Ok(None)
    }

    /// Remove the environment. Best-effort: a failed removal is logged,
    /// not propagated, so teardown never masks the run's outcome.
    pub async fn teardown(&self) {
        if self.root.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&self.root).await {
                tracing::warn!("Failed to remove env {}: {}", self.root.display(), e);
            }
        }
    }
}
