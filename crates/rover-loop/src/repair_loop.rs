//! Repair loop driver
//!
//! Runs one spec to completion within the calling task: generate, execute,
//! analyze, and on failure regenerate with the diagnosis as added context,
//! bounded by the configured maximum attempt count. Every full cycle
//! appends exactly one attempt record to the patch, so the history is a
//! complete audit trail even for exhausted or analyzer-unavailable
//! terminations.

use crate::state_machine::{transition, LoopAction, LoopEvent, LoopState};
use rover_agent::{OutcomeAnalyzer, PatchGenerator};
use rover_core::{
    AnalysisResult, AttemptRecord, Diagnosis, ExecutionOutcome, Patch, RepairContext, Result,
    RoverError, TaskSpec, Verdict,
};
use rover_sandbox::PatchExecutor;
use rover_store::ArtifactStore;
use serde::{Deserialize, Serialize};

/// Bounds for one repair-loop invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Hard ceiling on generate/execute/analyze cycles
    pub max_attempts: u32,
    /// Wall-clock bound for each sandbox execution
    pub timeout_secs: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_secs: 60,
        }
    }
}

/// Structured result of a finished loop
///
/// Callers can always distinguish "the model never produced working code"
/// (a terminal state in here) from "the system itself malfunctioned" (an
/// `Err` from [`RepairLoop::run`]).
#[derive(Debug, Clone)]
pub struct RepairReport {
    /// The terminal state the loop ended in
    pub state: LoopState,
    /// The final patch, with its full attempt history; `None` only when
    /// generation never produced one
    pub patch: Option<Patch>,
    /// Raw completion text from the last failed generation, kept for
    /// debugging when no patch ever parsed
    pub last_completion: Option<String>,
}

impl RepairReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.state, LoopState::DoneSuccess { .. })
    }

    pub fn attempts(&self) -> u32 {
        self.state.attempts()
    }
}

/// The orchestrator tying generator, sandbox, analyzer and store together
pub struct RepairLoop<G, E, A> {
    generator: G,
    executor: E,
    analyzer: A,
    store: ArtifactStore,
    config: RepairConfig,
}

impl<G, E, A> RepairLoop<G, E, A>
where
    G: PatchGenerator,
    E: PatchExecutor,
    A: OutcomeAnalyzer,
{
    pub fn new(generator: G, executor: E, analyzer: A, store: ArtifactStore) -> Self {
        Self {
            generator,
            executor,
            analyzer,
            store,
            config: RepairConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RepairConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the loop for one spec, to a terminal state
    ///
    /// Configuration-level problems (malformed spec, language the sandbox
    /// cannot execute) are rejected here, before the first generation.
    /// Everything the model or the generated code does wrong is absorbed
    /// into the state machine and reported in the [`RepairReport`].
    pub async fn run(&self, spec: &TaskSpec) -> Result<RepairReport> {
        spec.validate()?;
        if spec.language.interpreter().is_none() {
            return Err(RoverError::Spec(format!(
                "execution not supported for language '{}'",
                spec.language
            )));
        }

        tracing::info!(
            "Starting repair loop: '{}' ({}, max {} attempts)",
            spec.description,
            spec.language,
            self.config.max_attempts
        );

        let mut state = LoopState::Generating { attempt: 1 };
        let mut patch: Option<Patch> = None;
        let mut outcome: Option<ExecutionOutcome> = None;
        let mut prior_diagnosis: Option<Diagnosis> = None;
        let mut last_completion: Option<String> = None;

        while !state.is_terminal() {
            tracing::debug!("Loop state: {}", state);
            state = match state {
                LoopState::Generating { attempt } => {
                    let generated = {
                        let repair = match (prior_diagnosis.as_ref(), patch.as_ref()) {
                            (Some(diagnosis), Some(previous)) => Some(RepairContext {
                                diagnosis,
                                previous,
                            }),
                            _ => None,
                        };
                        self.generator.generate(spec, repair.as_ref()).await
                    };

                    let event = match generated {
                        Ok(generated) => {
                            let truncated = generated.truncated;
                            patch = Some(generated);
                            LoopEvent::Generated { truncated }
                        }
                        Err(RoverError::NoParsableCode { raw }) => {
                            tracing::warn!(
                                "Generation attempt {} produced no parsable code",
                                attempt
                            );
                            last_completion = Some(raw);
                            LoopEvent::GenerationErrored {
                                error: "no parsable code blocks in completion response"
                                    .to_string(),
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Generation attempt {} failed: {}", attempt, e);
                            LoopEvent::GenerationErrored {
                                error: e.to_string(),
                            }
                        }
                    };

                    let (next, _actions) =
                        transition(LoopState::Generating { attempt }, event, self.config.max_attempts);
                    next
                }

                LoopState::Executing { attempt } => {
                    let Some(current) = patch.as_ref() else {
                        state = LoopState::Faulted {
                            error: "executing with no patch".to_string(),
                        };
                        continue;
                    };

                    let executed = self
                        .executor
                        .execute(
                            &self.store.patch_dir(&current.id),
                            current,
                            self.config.timeout_secs,
                        )
                        .await?;

                    tracing::info!(
                        "Attempt {} executed: exit {}{}",
                        attempt,
                        executed.exit_code,
                        if executed.timed_out { " (timed out)" } else { "" }
                    );

                    let event = LoopEvent::Executed {
                        exit_code: executed.exit_code,
                        timed_out: executed.timed_out,
                    };
                    outcome = Some(executed);

                    let (next, _actions) =
                        transition(LoopState::Executing { attempt }, event, self.config.max_attempts);
                    next
                }

                LoopState::Analyzing { attempt } => {
                    let (Some(current), Some(observed)) = (patch.as_mut(), outcome.as_ref())
                    else {
                        state = LoopState::Faulted {
                            error: "analyzing with no patch or outcome".to_string(),
                        };
                        continue;
                    };

                    let analysis = self.analyzer.analyze(current, observed).await;
                    let (event, verdict, diagnosis) = match analysis {
                        AnalysisResult::Success => {
                            (LoopEvent::AnalyzedSuccess, Verdict::Success, None)
                        }
                        AnalysisResult::Failed(diagnosis) => (
                            LoopEvent::AnalyzedFailure {
                                classification: diagnosis.classification,
                            },
                            Verdict::Failure,
                            Some(diagnosis),
                        ),
                        AnalysisResult::Unavailable { reason } => (
                            LoopEvent::AnalysisUnavailable { reason },
                            Verdict::AnalyzerUnavailable,
                            None,
                        ),
                    };

                    let (next, actions) =
                        transition(LoopState::Analyzing { attempt }, event, self.config.max_attempts);

                    if actions.contains(&LoopAction::RecordAttempt) {
                        let mut record =
                            AttemptRecord::new(current.next_attempt(), observed, verdict);
                        if let Some(diagnosis) = &diagnosis {
                            record = record.with_diagnosis(diagnosis.clone());
                        }
                        current.record_attempt(record.clone());
                        self.store.append_attempt(&current.id, record).await?;
                    }

                    prior_diagnosis = diagnosis;
                    next
                }

                LoopState::Retrying { attempt } => {
                    tracing::info!(
                        "Attempt {} failed; regenerating with diagnosis as context",
                        attempt
                    );
                    let (next, _actions) = transition(
                        LoopState::Retrying { attempt },
                        LoopEvent::Resumed,
                        self.config.max_attempts,
                    );
                    next
                }

                terminal => terminal,
            };
        }

        tracing::info!("Repair loop finished: {}", state);
        Ok(RepairReport {
            state,
            patch,
            last_completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rover_core::{ExecPhase, FailureKind, Language};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Scripted generator: each entry is either file content for the entry
    /// file or an error to return
    struct MockGenerator {
        store: ArtifactStore,
        script: Mutex<Vec<std::result::Result<String, RoverError>>>,
        repair_calls: AtomicUsize,
    }

    impl MockGenerator {
        fn new(store: ArtifactStore, script: Vec<std::result::Result<String, RoverError>>) -> Self {
            Self {
                store,
                script: Mutex::new(script.into_iter().rev().collect()),
                repair_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PatchGenerator for MockGenerator {
        async fn generate(
            &self,
            spec: &TaskSpec,
            repair: Option<&RepairContext<'_>>,
        ) -> Result<Patch> {
            if repair.is_some() {
                self.repair_calls.fetch_add(1, Ordering::SeqCst);
            }
            let content = self
                .script
                .lock()
                .unwrap()
                .pop()
                .expect("mock generator script exhausted")?;

            let entry = spec.language.default_entry();
            let mut files = BTreeMap::new();
            files.insert(entry.clone(), content);

            let patch = match repair {
                Some(repair) => {
                    let mut patch = repair.previous.clone();
                    patch.replace_files(files, entry, false);
                    patch
                }
                None => Patch::new(spec, files, entry, false),
            };
            self.store.save(&patch).await?;
            Ok(patch)
        }
    }

    /// Scripted executor replaying canned outcomes
    struct MockExecutor {
        script: Mutex<Vec<ExecutionOutcome>>,
    }

    impl MockExecutor {
        fn new(script: Vec<ExecutionOutcome>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().rev().collect()),
            }
        }
    }

    #[async_trait]
    impl PatchExecutor for MockExecutor {
        async fn execute(
            &self,
            _patch_dir: &Path,
            _patch: &Patch,
            _timeout_secs: u64,
        ) -> Result<ExecutionOutcome> {
            Ok(self
                .script
                .lock()
                .unwrap()
                .pop()
                .expect("mock executor script exhausted"))
        }
    }

    /// Scripted analyzer replaying canned results
    struct MockAnalyzer {
        script: Mutex<Vec<AnalysisResult>>,
    }

    impl MockAnalyzer {
        fn new(script: Vec<AnalysisResult>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().rev().collect()),
            }
        }
    }

    #[async_trait]
    impl OutcomeAnalyzer for MockAnalyzer {
        async fn analyze(&self, _patch: &Patch, _outcome: &ExecutionOutcome) -> AnalysisResult {
            self.script
                .lock()
                .unwrap()
                .pop()
                .expect("mock analyzer script exhausted")
        }
    }

    fn python_spec() -> TaskSpec {
        TaskSpec::new("reverse a string and detect palindromes", Language::Python)
            .with_requirements(vec!["handle empty string".to_string()])
    }

    fn logic_error() -> AnalysisResult {
        AnalysisResult::Failed(Diagnosis::new(
            FailureKind::LogicError,
            "add a zero check before dividing",
        ))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let repair_loop = RepairLoop::new(
            MockGenerator::new(store.clone(), vec![Ok("def reverse(s): ...".to_string())]),
            MockExecutor::new(vec![ExecutionOutcome::run("racecar: palindrome", "", 0)]),
            MockAnalyzer::new(vec![AnalysisResult::Success]),
            store.clone(),
        );

        let report = repair_loop.run(&python_spec()).await.unwrap();
        assert!(report.succeeded());
        assert_eq!(report.state, LoopState::DoneSuccess { attempts: 1 });

        let patch = report.patch.unwrap();
        assert_eq!(patch.attempts.len(), 1);
        assert_eq!(patch.attempts[0].verdict, Verdict::Success);

        // History also persisted through the store
        let stored = store.load(&patch.id).await.unwrap();
        assert_eq!(stored.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_repair_succeeds_on_second_attempt() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let repair_loop = RepairLoop::new(
            MockGenerator::new(
                store.clone(),
                vec![
                    Ok("print(1/0)".to_string()),
                    Ok("print('guarded')".to_string()),
                ],
            ),
            MockExecutor::new(vec![
                ExecutionOutcome::run("", "ZeroDivisionError", 1),
                ExecutionOutcome::run("guarded", "", 0),
            ]),
            MockAnalyzer::new(vec![logic_error(), AnalysisResult::Success]),
            store.clone(),
        );

        let report = repair_loop.run(&python_spec()).await.unwrap();
        assert_eq!(report.state, LoopState::DoneSuccess { attempts: 2 });

        let patch = report.patch.unwrap();
        assert_eq!(patch.attempts.len(), 2);
        assert_eq!(patch.attempts[0].verdict, Verdict::Failure);
        assert_eq!(
            patch.attempts[0].diagnosis.as_ref().unwrap().classification,
            FailureKind::LogicError
        );
        assert_eq!(patch.attempts[1].verdict, Verdict::Success);
        assert_eq!(patch.entry_source(), Some("print('guarded')"));
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts_of_install_failures() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let install_failure = || {
            AnalysisResult::Failed(Diagnosis::new(
                FailureKind::DependencyInstall,
                "no matching distribution for nopkg",
            ))
        };

        let repair_loop = RepairLoop::new(
            MockGenerator::new(
                store.clone(),
                vec![
                    Ok("import nopkg".to_string()),
                    Ok("import nopkg  # again".to_string()),
                    Ok("import nopkg  # still".to_string()),
                ],
            ),
            MockExecutor::new(vec![
                ExecutionOutcome::install_failure("no matching distribution", 1),
                ExecutionOutcome::install_failure("no matching distribution", 1),
                ExecutionOutcome::install_failure("no matching distribution", 1),
            ]),
            MockAnalyzer::new(vec![install_failure(), install_failure(), install_failure()]),
            store.clone(),
        );

        let report = repair_loop.run(&python_spec()).await.unwrap();
        assert_eq!(report.state, LoopState::DoneExhausted { attempts: 3 });

        let patch = report.patch.unwrap();
        assert_eq!(patch.attempts.len(), 3);
        for record in &patch.attempts {
            assert_eq!(
                record.diagnosis.as_ref().unwrap().classification,
                FailureKind::DependencyInstall
            );
        }
    }

    #[tokio::test]
    async fn test_never_more_records_than_max_attempts() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        // Every diagnosis looks actionable; the bound must still hold
        let repair_loop = RepairLoop::new(
            MockGenerator::new(
                store.clone(),
                (0..5).map(|i| Ok(format!("print({})", i))).collect(),
            ),
            MockExecutor::new(
                (0..5)
                    .map(|_| ExecutionOutcome::run("", "boom", 1))
                    .collect(),
            ),
            MockAnalyzer::new((0..5).map(|_| logic_error()).collect()),
            store.clone(),
        )
        .with_config(RepairConfig {
            max_attempts: 2,
            timeout_secs: 10,
        });

        let report = repair_loop.run(&python_spec()).await.unwrap();
        assert_eq!(report.state, LoopState::DoneExhausted { attempts: 2 });
        assert_eq!(report.patch.unwrap().attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_analyzer_unavailable_terminates_gracefully() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let repair_loop = RepairLoop::new(
            MockGenerator::new(store.clone(), vec![Ok("print('hi')".to_string())]),
            MockExecutor::new(vec![ExecutionOutcome::run("", "Traceback ...", 1)]),
            MockAnalyzer::new(vec![AnalysisResult::Unavailable {
                reason: "completion API down".to_string(),
            }]),
            store.clone(),
        );

        let report = repair_loop.run(&python_spec()).await.unwrap();
        assert_eq!(report.state, LoopState::DoneAnalyzerUnavailable { attempts: 1 });

        // Raw output surfaced through the attempt record
        let patch = report.patch.unwrap();
        assert_eq!(patch.attempts.len(), 1);
        assert_eq!(patch.attempts[0].verdict, Verdict::AnalyzerUnavailable);
        assert!(patch.attempts[0].stderr.contains("Traceback"));
    }

    #[tokio::test]
    async fn test_generation_failure_exhausts_budget() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let no_code = || {
            Err(RoverError::NoParsableCode {
                raw: "I cannot write that.".to_string(),
            })
        };

        let repair_loop = RepairLoop::new(
            MockGenerator::new(store.clone(), vec![no_code(), no_code(), no_code()]),
            MockExecutor::new(vec![]),
            MockAnalyzer::new(vec![]),
            store.clone(),
        );

        let report = repair_loop.run(&python_spec()).await.unwrap();
        assert!(matches!(
            report.state,
            LoopState::GenerationFailed { attempts: 3, .. }
        ));
        assert!(report.patch.is_none());
        assert_eq!(report.last_completion.as_deref(), Some("I cannot write that."));
    }

    #[tokio::test]
    async fn test_unsupported_language_rejected_before_generating() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let repair_loop = RepairLoop::new(
            MockGenerator::new(store.clone(), vec![Ok("unused".to_string())]),
            MockExecutor::new(vec![]),
            MockAnalyzer::new(vec![]),
            store.clone(),
        );

        let spec = TaskSpec::new("write a CLI", Language::Rust);
        let result = repair_loop.run(&spec).await;
        assert!(matches!(result, Err(RoverError::Spec(_))));
    }

    #[tokio::test]
    async fn test_timeout_outcome_counts_toward_budget() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let repair_loop = RepairLoop::new(
            MockGenerator::new(
                store.clone(),
                vec![
                    Ok("while True: pass".to_string()),
                    Ok("print('done')".to_string()),
                ],
            ),
            MockExecutor::new(vec![
                ExecutionOutcome::timeout(5),
                ExecutionOutcome::run("done", "", 0),
            ]),
            MockAnalyzer::new(vec![
                AnalysisResult::Failed(Diagnosis::new(
                    FailureKind::Timeout,
                    "remove the infinite loop",
                )),
                AnalysisResult::Success,
            ]),
            store.clone(),
        );

        let report = repair_loop.run(&python_spec()).await.unwrap();
        assert_eq!(report.state, LoopState::DoneSuccess { attempts: 2 });
        let patch = report.patch.unwrap();
        assert_eq!(
            patch.attempts[0].exit_code,
            rover_core::TIMEOUT_EXIT_CODE
        );
    }

    #[tokio::test]
    async fn test_repair_pass_receives_prior_context() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let generator = Arc::new(MockGenerator::new(
            store.clone(),
            vec![Ok("v1".to_string()), Ok("v2".to_string())],
        ));
        let observer = Arc::clone(&generator);

        struct SharedGenerator(Arc<MockGenerator>);

        #[async_trait]
        impl PatchGenerator for SharedGenerator {
            async fn generate(
                &self,
                spec: &TaskSpec,
                repair: Option<&RepairContext<'_>>,
            ) -> Result<Patch> {
                self.0.generate(spec, repair).await
            }
        }

        let repair_loop = RepairLoop::new(
            SharedGenerator(generator),
            MockExecutor::new(vec![
                ExecutionOutcome::run("", "err", 1),
                ExecutionOutcome::run("ok", "", 0),
            ]),
            MockAnalyzer::new(vec![logic_error(), AnalysisResult::Success]),
            store.clone(),
        );

        repair_loop.run(&python_spec()).await.unwrap();
        assert_eq!(observer.repair_calls.load(Ordering::SeqCst), 1);
    }
}
