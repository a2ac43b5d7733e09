//! Patch execution with enforced wall-clock timeout
//!
//! The child process and its dependency environment are scoped resources:
//! the process is killed and reaped on timeout, the environment is torn
//! down on every exit path.

use crate::env::DependencyEnv;
use async_trait::async_trait;
use rover_core::{ExecutionOutcome, Language, Patch, Result, RoverError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

const SRC_DIR: &str = "src";

/// Trait seam for the execution step
#[async_trait]
pub trait PatchExecutor: Send + Sync {
    /// Run the patch's entry file inside its working directory
    async fn execute(
        &self,
        patch_dir: &Path,
        patch: &Patch,
        timeout_secs: u64,
    ) -> Result<ExecutionOutcome>;
}

/// Executes patches from their artifact-store directories
#[derive(Debug, Clone, Default)]
pub struct Sandbox;

impl Sandbox {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the interpreter command for a patch, provisioning the
    /// dependency environment when the language has one
    async fn resolve_interpreter(
        &self,
        patch_dir: &Path,
        patch: &Patch,
    ) -> Result<std::result::Result<(PathBuf, Option<DependencyEnv>), ExecutionOutcome>> {
        match patch.language {
            Language::Python => {
                let env = DependencyEnv::new(patch_dir);
                match env.provision(&patch.dependencies).await {
                    Ok(None) => Ok(Ok((env.interpreter(), Some(env)))),
                    Ok(Some(install_failure)) => {
                        env.teardown().await;
                        Ok(Err(install_failure))
                    }
                    Err(e) => {
                        env.teardown().await;
                        Err(e)
                    }
                }
            }
            other => match other.interpreter() {
                Some(binary) => Ok(Ok((PathBuf::from(binary), None))),
                None => Err(RoverError::UnsupportedExecution(other.to_string())),
            },
        }
    }
}

#[async_trait]
impl PatchExecutor for Sandbox {
    async fn execute(
        &self,
        patch_dir: &Path,
        patch: &Patch,
        timeout_secs: u64,
    ) -> Result<ExecutionOutcome> {
        let src_dir = patch_dir.join(SRC_DIR);
        let entry_path = src_dir.join(&patch.entry_file);
        if !entry_path.exists() {
            return Err(RoverError::Execution(format!(
                "entry file {} not found in {}",
                patch.entry_file,
                src_dir.display()
            )));
        }

        let (interpreter, env) = match self.resolve_interpreter(patch_dir, patch).await? {
            Ok(resolved) => resolved,
            Err(install_failure) => return Ok(install_failure),
        };

        tracing::info!(
            "Executing {} with {} (timeout {}s)",
            patch.entry_file,
            interpreter.display(),
            timeout_secs
        );

        let outcome = run_with_timeout(
            Command::new(&interpreter).arg(&entry_path).current_dir(&src_dir),
            timeout_secs,
        )
        .await;

        if let Some(env) = env {
            env.teardown().await;
        }

        outcome
    }
}

/// Spawn the command, capture stdio, and enforce the wall-clock bound
///
/// On timeout the child is force-killed and reaped, and a synthetic
/// outcome with the reserved timeout exit code is returned.
pub async fn run_with_timeout(command: &mut Command, timeout_secs: u64) -> Result<ExecutionOutcome> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RoverError::Execution(format!("failed to spawn process: {}", e)))?;

    // Drain both pipes concurrently so a chatty child can't deadlock on a
    // full pipe buffer while we wait for exit
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status) => {
            let status =
                status.map_err(|e| RoverError::Execution(format!("failed to wait: {}", e)))?;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(ExecutionOutcome::run(
                String::from_utf8_lossy(&stdout).to_string(),
                String::from_utf8_lossy(&stderr).to_string(),
                status.code().unwrap_or(-1),
            ))
        }
        Err(_) => {
            tracing::warn!("Execution timed out after {}s, killing process", timeout_secs);
            let _ = child.start_kill();
            // Reap so the child doesn't linger as a zombie
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            Ok(ExecutionOutcome::timeout(timeout_secs))
        }
    }
}
