//! Git command execution

use rover_core::{Result, RoverError};
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

/// Output from a git command
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl From<Output> for GitOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }
}

/// Runs git operations against one repository root
#[derive(Debug, Clone)]
pub struct GitManager {
    repo_root: PathBuf,
}

impl GitManager {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    async fn run(&self, args: &[&str]) -> Result<GitOutput> {
        tracing::debug!("Running git {:?}", args);
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .await
            .map_err(|e| RoverError::Git(format!("failed to execute git: {}", e)))?;
        Ok(GitOutput::from(output))
    }

    async fn run_checked(&self, args: &[&str]) -> Result<GitOutput> {
        let output = self.run(args).await?;
        if !output.success {
            return Err(RoverError::Git(format!(
                "git {} failed: {}",
                args.first().unwrap_or(&"?"),
                output.stderr.trim()
            )));
        }
        Ok(output)
    }

    /// Initialize a repository at the root (no-op if already initialized)
    pub async fn init(&self) -> Result<()> {
        self.run_checked(&["init"]).await?;
        tracing::info!("Initialized git repository at {}", self.repo_root.display());
        Ok(())
    }

    /// Configure the committing user
    pub async fn configure_user(&self, name: &str, email: &str) -> Result<()> {
        self.run_checked(&["config", "user.name", name]).await?;
        self.run_checked(&["config", "user.email", email]).await?;
        Ok(())
    }

    /// Add (or repoint) a remote
    pub async fn set_remote(&self, name: &str, url: &str) -> Result<()> {
        let added = self.run(&["remote", "add", name, url]).await?;
        if !added.success {
            // Remote already exists; repoint it
            self.run_checked(&["remote", "set-url", name, url]).await?;
        }
        Ok(())
    }

    /// Stage paths relative to the repository root
    pub async fn add(&self, paths: &[String]) -> Result<()> {
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_checked(&args).await?;
        Ok(())
    }

    /// Commit staged changes
    pub async fn commit(&self, message: &str) -> Result<()> {
        self.run_checked(&["commit", "-m", message]).await?;
        tracing::info!("Committed: {}", message.lines().next().unwrap_or(message));
        Ok(())
    }

    /// Push a branch to a remote
    pub async fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(&["push", remote, branch]).await?;
        tracing::info!("Pushed {} to {}", branch, remote);
        Ok(())
    }

    /// Porcelain status of the working tree
    pub async fn status(&self) -> Result<String> {
        let output = self.run_checked(&["status", "--porcelain"]).await?;
        Ok(output.stdout)
    }

    /// Stage and commit one patch directory
    ///
    /// The patch directory must be inside the repository root; the loop
    /// guarantees a terminal patch has a fully materialized, self-consistent
    /// working directory before it is handed off here.
    pub async fn commit_patch(&self, patch_dir: &Path, message: &str) -> Result<()> {
        let rel = patch_dir
            .strip_prefix(&self.repo_root)
            .map_err(|_| {
                RoverError::Git(format!(
                    "patch directory {} is outside the repository {}",
                    patch_dir.display(),
                    self.repo_root.display()
                ))
            })?
            .to_string_lossy()
            .to_string();

        self.add(&[rel]).await?;
        self.commit(message).await
    }
}

/// Conventional commit message for a published patch
pub fn patch_commit_message(patch_id: &str, description: &str, attempts: usize) -> String {
    format!(
        "Add patch {}: {}\n\nGenerated in {} attempt(s).\n",
        patch_id, description, attempts
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_commit_message_format() {
        let message = patch_commit_message("20250101-120000-demo-abc123", "demo task", 2);
        assert!(message.starts_with("Add patch 20250101-120000-demo-abc123: demo task"));
        assert!(message.contains("2 attempt(s)"));
    }

    #[tokio::test]
    async fn test_commit_patch_rejects_outside_paths() {
        let manager = GitManager::new("/repo/root");
        let result = manager
            .commit_patch(Path::new("/elsewhere/patch"), "msg")
            .await;
        assert!(matches!(result, Err(RoverError::Git(_))));
    }
}
