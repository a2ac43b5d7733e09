//! Artifact store - one directory per patch
//!
//! On-disk layout:
//!
//! ```text
//! patches/
//!   20250101-120000-reverse-a-string-a1b2c3/
//!     metadata.json       language, description, entry file, attempt history
//!     requirements.txt    dependency manifest (Python patches)
//!     src/                generated source subtree
//!       main.py
//! ```
//!
//! Metadata writes go through a temp file + rename so a concurrent reader
//! never observes a half-written record.

use chrono::{DateTime, Utc};
use rover_core::{AttemptRecord, Language, Patch, Result, RoverError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const METADATA_FILE: &str = "metadata.json";
const SRC_DIR: &str = "src";

/// Everything about a patch except the source file contents, which live
/// in the `src/` subtree
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PatchMetadata {
    language: Language,
    description: String,
    #[serde(default)]
    context: Option<String>,
    entry_file: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    truncated: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    attempts: Vec<AttemptRecord>,
}

impl PatchMetadata {
    fn of(patch: &Patch) -> Self {
        Self {
            language: patch.language,
            description: patch.description.clone(),
            context: patch.context.clone(),
            entry_file: patch.entry_file.clone(),
            dependencies: patch.dependencies.clone(),
            truncated: patch.truncated,
            created_at: patch.created_at,
            attempts: patch.attempts.clone(),
        }
    }

    fn into_patch(self, id: String, files: BTreeMap<String, String>) -> Patch {
        Patch {
            id,
            language: self.language,
            description: self.description,
            context: self.context,
            files,
            dependencies: self.dependencies,
            entry_file: self.entry_file,
            truncated: self.truncated,
            created_at: self.created_at,
            attempts: self.attempts,
        }
    }
}

/// Listing entry for a stored patch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSummary {
    pub id: String,
    pub language: Language,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub attempts: usize,
    pub truncated: bool,
}

/// Manages patch directories under a single root
///
/// Each patch directory is exclusively owned by the patch with that id;
/// two repair loops must never write to the same id concurrently.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory holding all patch directories
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working directory for a patch id
    pub fn patch_dir(&self, patch_id: &str) -> PathBuf {
        self.root.join(patch_id)
    }

    /// Write a patch to disk: source subtree, manifest, metadata
    ///
    /// The existing source subtree is removed first, so a regeneration's
    /// file set fully replaces the prior one.
    pub async fn save(&self, patch: &Patch) -> Result<()> {
        let dir = self.patch_dir(&patch.id);
        let src = dir.join(SRC_DIR);

        if src.exists() {
            fs::remove_dir_all(&src).await?;
        }
        fs::create_dir_all(&src).await?;

        for (rel_path, content) in &patch.files {
            let rel = validate_rel_path(rel_path)?;
            let file_path = src.join(rel);
            if let Some(parent) = file_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&file_path, content).await?;
        }

        if let Some(manifest) = patch.language.manifest() {
            let mut body = patch.dependencies.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            fs::write(dir.join(manifest), body).await?;
        }

        self.write_metadata(&dir, &PatchMetadata::of(patch)).await?;
        tracing::debug!("Saved patch {} ({} files)", patch.id, patch.files.len());
        Ok(())
    }

    /// Load a patch back from disk
    pub async fn load(&self, patch_id: &str) -> Result<Patch> {
        let dir = self.patch_dir(patch_id);
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(RoverError::PatchNotFound(patch_id.to_string()));
        }

        let raw = fs::read_to_string(&metadata_path).await?;
        let metadata: PatchMetadata = serde_json::from_str(&raw)?;
        let files = read_source_tree(&dir.join(SRC_DIR)).await?;
        Ok(metadata.into_patch(patch_id.to_string(), files))
    }

    /// Append one attempt record to a stored patch's history
    ///
    /// The write replaces the whole metadata record atomically; there is no
    /// partial-write-then-patch step for an abandoning caller to corrupt.
    pub async fn append_attempt(&self, patch_id: &str, record: AttemptRecord) -> Result<()> {
        let dir = self.patch_dir(patch_id);
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(RoverError::PatchNotFound(patch_id.to_string()));
        }

        let raw = fs::read_to_string(&metadata_path).await?;
        let mut metadata: PatchMetadata = serde_json::from_str(&raw)?;
        metadata.attempts.push(record);
        self.write_metadata(&dir, &metadata).await
    }

    /// List summaries of all stored patches, newest first
    pub async fn list(&self) -> Result<Vec<PatchSummary>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.path().is_dir() {
                continue;
            }
            let metadata_path = entry.path().join(METADATA_FILE);
            if !metadata_path.exists() {
                continue;
            }
            let raw = fs::read_to_string(&metadata_path).await?;
            let metadata: PatchMetadata = match serde_json::from_str::<PatchMetadata>(&raw) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Skipping unreadable patch metadata in {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            summaries.push(PatchSummary {
                id: entry.file_name().to_string_lossy().to_string(),
                language: metadata.language,
                description: metadata.description,
                created_at: metadata.created_at,
                attempts: metadata.attempts.len(),
                truncated: metadata.truncated,
            });
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    /// Delete a patch directory
    pub async fn delete(&self, patch_id: &str) -> Result<()> {
        let dir = self.patch_dir(patch_id);
        if !dir.exists() {
            return Err(RoverError::PatchNotFound(patch_id.to_string()));
        }
        fs::remove_dir_all(&dir).await?;
        tracing::info!("Deleted patch {}", patch_id);
        Ok(())
    }

    /// Delete every stored patch, returning how many were removed
    pub async fn clear(&self) -> Result<usize> {
        let summaries = self.list().await?;
        for summary in &summaries {
            fs::remove_dir_all(self.patch_dir(&summary.id)).await?;
        }
        Ok(summaries.len())
    }

    async fn write_metadata(&self, dir: &Path, metadata: &PatchMetadata) -> Result<()> {
        let body = serde_json::to_string_pretty(metadata)?;
        let tmp = dir.join(format!(".{}.tmp", METADATA_FILE));
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, dir.join(METADATA_FILE)).await?;
        Ok(())
    }
}

/// Validate a patch-relative source path
///
/// Absolute paths and parent-directory traversal are rejected so a patch
/// can never write outside its own directory.
pub fn validate_rel_path(path: &str) -> Result<PathBuf> {
    let path = Path::new(path);

    if path.as_os_str().is_empty() {
        return Err(RoverError::PathValidation("empty path".to_string()));
    }
    if path.is_absolute() {
        return Err(RoverError::PathValidation(format!(
            "absolute paths not allowed: {}",
            path.display()
        )));
    }
    for component in path.components() {
        if let std::path::Component::ParentDir = component {
            return Err(RoverError::PathValidation(format!(
                "path traversal not allowed: {}",
                path.display()
            )));
        }
    }

    Ok(path.to_path_buf())
}

/// Collect all files under `src/` as relative-path -> content
async fn read_source_tree(src: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    if !src.exists() {
        return Ok(files);
    }

    let mut pending = vec![src.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let rel = path
                    .strip_prefix(src)
                    .map_err(|e| RoverError::Store(format!("bad source path: {}", e)))?
                    .to_string_lossy()
                    .to_string();
                let content = fs::read_to_string(&path).await?;
                files.insert(rel, content);
            }
        }
    }

    Ok(files)
}
