//! Code generator - one call-and-parse contract against the completion model
//!
//! `generate` builds the prompt, runs a single low-temperature completion,
//! extracts labeled source files, and persists the patch through the
//! artifact store BEFORE returning it, so a failure in a later stage never
//! loses the generated artifact.

use crate::client::CompletionBackend;
use crate::parser::{self, extract_sources};
use crate::prompt::build_generation_prompt;
use async_trait::async_trait;
use rover_core::{Patch, RepairContext, Result, RoverError, TaskSpec};
use rover_store::ArtifactStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Sampling parameters for generation calls
///
/// Temperature is low by default: the goal is working code, not novelty.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.2,
        }
    }
}

/// Trait seam for the generation step, so the repair loop can be driven by
/// a scripted generator in tests
#[async_trait]
pub trait PatchGenerator: Send + Sync {
    /// Produce (or on a repair pass, regenerate) a patch for the spec
    async fn generate(
        &self,
        spec: &TaskSpec,
        repair: Option<&RepairContext<'_>>,
    ) -> Result<Patch>;
}

/// Completion-model backed code generator
pub struct CodeGenerator {
    backend: Arc<dyn CompletionBackend>,
    store: ArtifactStore,
    config: GeneratorConfig,
}

impl CodeGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>, store: ArtifactStore) -> Self {
        Self {
            backend,
            store,
            config: GeneratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Split the manifest out of the extracted files and merge it into the
    /// declared dependency list
    fn partition_dependencies(
        &self,
        mut files: BTreeMap<String, String>,
        spec: &TaskSpec,
    ) -> (BTreeMap<String, String>, Vec<String>) {
        let mut dependencies = spec.dependencies.clone();

        if let Some(manifest) = spec.language.manifest() {
            if let Some(body) = files.remove(manifest) {
                for entry in parser::parse_requirement_lines(&body) {
                    let name = package_name(&entry);
                    if !dependencies.iter().any(|d| package_name(d) == name) {
                        dependencies.push(entry);
                    }
                }
            }
        }

        (files, dependencies)
    }
}

#[async_trait]
impl PatchGenerator for CodeGenerator {
    async fn generate(
        &self,
        spec: &TaskSpec,
        repair: Option<&RepairContext<'_>>,
    ) -> Result<Patch> {
        spec.validate()?;

        let prompt = build_generation_prompt(spec, repair);
        tracing::debug!("Generation prompt: {} chars", prompt.len());

        let completion = self
            .backend
            .complete(&prompt, self.config.max_tokens, self.config.temperature)
            .await?;

        let parsed = extract_sources(&completion.text, spec.language);
        if parsed.is_empty() {
            return Err(RoverError::NoParsableCode {
                raw: completion.text,
            });
        }

        let truncated = parsed.truncated || completion.truncated;
        if truncated {
            tracing::warn!("Generated source may be truncated; keeping best-effort content");
        }

        let (files, dependencies) = self.partition_dependencies(parsed.files, spec);
        if files.is_empty() {
            // Everything the model produced was manifest content
            return Err(RoverError::NoParsableCode {
                raw: completion.text,
            });
        }
        let entry_file = elect_entry_file(&files, spec);

        let patch = match repair {
            Some(repair) => {
                // Regeneration mutates the existing patch in place: same id,
                // same history, new file set
                let mut patch = repair.previous.clone();
                patch.replace_files(files, entry_file, truncated);
                patch.dependencies = dependencies;
                patch
            }
            None => {
                let mut patch = Patch::new(spec, files, entry_file, truncated);
                patch.dependencies = dependencies;
                patch
            }
        };

        self.store.save(&patch).await?;
        tracing::info!(
            "Generated patch {} ({} files, entry {})",
            patch.id,
            patch.files.len(),
            patch.entry_file
        );
        Ok(patch)
    }
}

/// Designate the one canonical entry file
///
/// Prefers the conventional default (`main.py`), then any file with the
/// language's extension, then the first file.
fn elect_entry_file(files: &BTreeMap<String, String>, spec: &TaskSpec) -> String {
    let default = spec.language.default_entry();
    if files.contains_key(&default) {
        return default;
    }

    let extension = format!(".{}", spec.language.extension());
    files
        .keys()
        .find(|path| path.ends_with(&extension))
        .or_else(|| files.keys().next())
        .cloned()
        .unwrap_or(default)
}

/// Bare package name of a requirement entry (`requests>=2.0` -> `requests`)
fn package_name(entry: &str) -> String {
    entry
        .split(|c: char| "=<>!~[ ".contains(c))
        .next()
        .unwrap_or(entry)
        .to_lowercase()
}
