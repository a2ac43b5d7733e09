//! Task-record persistence
//!
//! A small JSON-file-backed table of submitted tasks. Ids are assigned
//! monotonically; every mutation rewrites the file through a temp file +
//! rename so a crash never leaves a half-written table.

use chrono::{DateTime, Utc};
use rover_core::{Language, Result, TaskSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;

/// One submitted task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub language: Language,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub completed: bool,
    /// Id of the patch generated for this task, once one exists
    #[serde(default)]
    pub patch_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Build the spec that seeds generation for this task
    pub fn to_spec(&self) -> TaskSpec {
        let description = if self.description.trim().is_empty() {
            self.title.clone()
        } else {
            self.description.clone()
        };
        let mut spec = TaskSpec::new(description, self.language)
            .with_requirements(self.requirements.clone())
            .with_dependencies(self.dependencies.clone());
        if let Some(context) = &self.context {
            spec = spec.with_context(context.clone());
        }
        spec.metadata = self.metadata.clone();
        spec
    }
}

/// Payload for creating a task
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskTable {
    next_id: u64,
    records: Vec<TaskRecord>,
}

/// JSON-file-backed task store
pub struct TaskRecords {
    path: PathBuf,
    table: RwLock<TaskTable>,
}

impl TaskRecords {
    /// Open (or create) the table at the given path
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = if path.exists() {
            let raw = fs::read_to_string(&path).await?;
            serde_json::from_str(&raw)?
        } else {
            TaskTable {
                next_id: 1,
                records: Vec::new(),
            }
        };
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    pub async fn create(&self, new: NewTask) -> Result<TaskRecord> {
        let mut table = self.table.write().await;
        let record = TaskRecord {
            id: table.next_id,
            title: new.title,
            description: new.description.unwrap_or_default(),
            language: new.language.unwrap_or_default(),
            requirements: new.requirements,
            dependencies: new.dependencies,
            context: new.context,
            metadata: new.metadata,
            completed: false,
            patch_id: None,
            created_at: Utc::now(),
        };
        table.next_id += 1;
        table.records.push(record.clone());
        self.persist(&table).await?;
        tracing::info!("Created task {}: {}", record.id, record.title);
        Ok(record)
    }

    pub async fn get(&self, id: u64) -> Option<TaskRecord> {
        self.table
            .read()
            .await
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<TaskRecord> {
        self.table.read().await.records.clone()
    }

    /// Case-insensitive substring search over title and description
    pub async fn search(&self, query: &str) -> Vec<TaskRecord> {
        let needle = query.to_lowercase();
        self.table
            .read()
            .await
            .records
            .iter()
            .filter(|r| {
                r.title.to_lowercase().contains(&needle)
                    || r.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    pub async fn mark_complete(&self, id: u64) -> Result<Option<TaskRecord>> {
        let mut table = self.table.write().await;
        let Some(record) = table.records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        record.completed = true;
        let updated = record.clone();
        self.persist(&table).await?;
        Ok(Some(updated))
    }

    /// Link a generated patch to its task
    pub async fn set_patch(&self, id: u64, patch_id: &str) -> Result<bool> {
        let mut table = self.table.write().await;
        let Some(record) = table.records.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        record.patch_id = Some(patch_id.to_string());
        self.persist(&table).await?;
        Ok(true)
    }

    pub async fn delete(&self, id: u64) -> Result<bool> {
        let mut table = self.table.write().await;
        let before = table.records.len();
        table.records.retain(|r| r.id != id);
        if table.records.len() == before {
            return Ok(false);
        }
        self.persist(&table).await?;
        Ok(true)
    }

    async fn persist(&self, table: &TaskTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(table)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
