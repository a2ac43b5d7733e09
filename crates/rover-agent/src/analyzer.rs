//! Output analyzer - classify execution outcomes, cheaply when possible
//!
//! The common case (exit 0, clean stderr) short-circuits to success without
//! a completion call. Timeouts, install failures and truncated source are
//! classified heuristically. Only genuinely ambiguous failures spend one
//! completion call, and a failure of THAT call degrades to an
//! analyzer-unavailable sentinel instead of an error, so the repair loop
//! can always terminate gracefully.

use crate::client::CompletionBackend;
use crate::prompt::build_analysis_prompt;
use async_trait::async_trait;
use rover_core::{
    AnalysisResult, Diagnosis, ExecPhase, ExecutionOutcome, FailureKind, Patch, Result,
};
use std::sync::Arc;

const ANALYSIS_MAX_TOKENS: usize = 2048;
const ANALYSIS_TEMPERATURE: f32 = 0.2;

/// Trait seam for the analysis step
#[async_trait]
pub trait OutcomeAnalyzer: Send + Sync {
    /// Judge one execution outcome
    async fn analyze(&self, patch: &Patch, outcome: &ExecutionOutcome) -> AnalysisResult;
}

/// Completion-model backed analyzer
pub struct Analyzer {
    backend: Arc<dyn CompletionBackend>,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Heuristic classification that needs no model call, when the outcome
    /// speaks for itself
    fn pre_check(&self, patch: &Patch, outcome: &ExecutionOutcome) -> Option<AnalysisResult> {
        if outcome.timed_out {
            return Some(AnalysisResult::Failed(Diagnosis::new(
                FailureKind::Timeout,
                "Execution exceeded the time limit. Remove blocking waits, unbounded \
                 loops and interactive input; the program must terminate on its own.",
            )));
        }

        if outcome.phase == ExecPhase::Install {
            return Some(AnalysisResult::Failed(Diagnosis::new(
                FailureKind::DependencyInstall,
                format!(
                    "Dependency installation failed; fix the dependency list. Installer said:\n{}",
                    outcome.stderr
                ),
            )));
        }

        if outcome.exit_code == 0 && is_benign_stderr(&outcome.stderr) {
            return Some(AnalysisResult::Success);
        }

        if patch.truncated {
            return Some(AnalysisResult::Failed(Diagnosis::new(
                FailureKind::IncompleteSource,
                "The generated source was cut off before the final file completed. \
                 Regenerate the complete implementation, keeping it concise.",
            )));
        }

        None
    }

    async fn classify_with_model(
        &self,
        patch: &Patch,
        outcome: &ExecutionOutcome,
    ) -> Result<Diagnosis> {
        let prompt = build_analysis_prompt(patch, outcome);
        let completion = self
            .backend
            .complete(&prompt, ANALYSIS_MAX_TOKENS, ANALYSIS_TEMPERATURE)
            .await?;
        Ok(parse_diagnosis(&completion.text))
    }
}

#[async_trait]
impl OutcomeAnalyzer for Analyzer {
    async fn analyze(&self, patch: &Patch, outcome: &ExecutionOutcome) -> AnalysisResult {
        if let Some(result) = self.pre_check(patch, outcome) {
            tracing::debug!("Analyzer pre-check resolved the outcome without a model call");
            return result;
        }

        match self.classify_with_model(patch, outcome).await {
            Ok(diagnosis) => {
                tracing::info!(
                    "Analyzer classified failure as {}",
                    diagnosis.classification
                );
                AnalysisResult::Failed(diagnosis)
            }
            Err(e) => {
                tracing::warn!("Analysis completion call failed: {}", e);
                AnalysisResult::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Whether stderr content is empty or contains only recognized benign
/// warnings
pub fn is_benign_stderr(stderr: &str) -> bool {
    stderr.lines().map(str::trim).all(|line| {
        line.is_empty()
            || line.starts_with("WARNING")
            || line.starts_with("warning:")
            || line.contains("DeprecationWarning")
            || line.contains("FutureWarning")
            || line.contains("NotOpenSSLWarning")
            || line.starts_with("[notice]")
    })
}

/// Parse a completion reply into the fixed diagnosis shape
///
/// Falls back to the raw text as the suggested fix with classification
/// "unclassified" when the reply does not match.
pub fn parse_diagnosis(text: &str) -> Diagnosis {
    let mut classification = None;
    let mut fix_lines: Vec<&str> = Vec::new();
    let mut in_fix = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("CLASSIFICATION:") {
            classification = rest.trim().parse::<FailureKind>().ok();
            in_fix = false;
        } else if let Some(rest) = trimmed.strip_prefix("FIX:") {
            fix_lines.push(rest.trim());
            in_fix = true;
        } else if in_fix {
            fix_lines.push(line);
        }
    }

    match (classification, fix_lines.is_empty()) {
        (Some(kind), false) => Diagnosis::new(kind, fix_lines.join("\n").trim().to_string()),
        (Some(kind), true) => Diagnosis::new(kind, text.trim().to_string()),
        (None, _) => Diagnosis::new(FailureKind::Unclassified, text.trim().to_string()),
    }
}
