//! Pure state machine for the repair loop
//!
//! No async, no I/O, no dependencies beyond core types. All transitions are
//! deterministic; invalid transitions go to a Faulted state, never panic.
//! The maximum-attempts bound is enforced here, structurally: no sequence
//! of events can produce more generate/execute/analyze cycles than the
//! configured ceiling.

use rover_core::FailureKind;

/// Repair loop state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// Asking the model for code (attempt is 1-based)
    Generating { attempt: u32 },
    /// Running the generated patch
    Executing { attempt: u32 },
    /// Judging the execution outcome
    Analyzing { attempt: u32 },
    /// Failure diagnosed and budget remains; about to regenerate
    Retrying { attempt: u32 },
    /// Terminal: the analyzer accepted an execution
    DoneSuccess { attempts: u32 },
    /// Terminal: the attempt budget ran out without a success
    DoneExhausted { attempts: u32 },
    /// Terminal: the analysis call itself could not run
    DoneAnalyzerUnavailable { attempts: u32 },
    /// Terminal: the generator never produced a parsable patch
    GenerationFailed { attempts: u32, error: String },
    /// Terminal: the loop itself malfunctioned (invalid transition)
    Faulted { error: String },
}

impl LoopState {
    /// Whether this state ends the loop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DoneSuccess { .. }
                | Self::DoneExhausted { .. }
                | Self::DoneAnalyzerUnavailable { .. }
                | Self::GenerationFailed { .. }
                | Self::Faulted { .. }
        )
    }

    /// Number of completed attempts for terminal states
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Generating { attempt }
            | Self::Executing { attempt }
            | Self::Analyzing { attempt }
            | Self::Retrying { attempt } => attempt.saturating_sub(1),
            Self::DoneSuccess { attempts }
            | Self::DoneExhausted { attempts }
            | Self::DoneAnalyzerUnavailable { attempts }
            | Self::GenerationFailed { attempts, .. } => *attempts,
            Self::Faulted { .. } => 0,
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generating { attempt } => write!(f, "generating (attempt {})", attempt),
            Self::Executing { attempt } => write!(f, "executing (attempt {})", attempt),
            Self::Analyzing { attempt } => write!(f, "analyzing (attempt {})", attempt),
            Self::Retrying { attempt } => write!(f, "retrying (after attempt {})", attempt),
            Self::DoneSuccess { attempts } => write!(f, "done: success in {} attempt(s)", attempts),
            Self::DoneExhausted { attempts } => {
                write!(f, "done: exhausted after {} attempt(s)", attempts)
            }
            Self::DoneAnalyzerUnavailable { attempts } => {
                write!(f, "done: analyzer unavailable after {} attempt(s)", attempts)
            }
            Self::GenerationFailed { error, .. } => write!(f, "done: generation failed ({})", error),
            Self::Faulted { error } => write!(f, "faulted: {}", error),
        }
    }
}

/// Events that drive the loop forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// The generator produced a patch (possibly truncated)
    Generated { truncated: bool },
    /// The generator failed (completion error or unparsable output)
    GenerationErrored { error: String },
    /// The sandbox finished (success, crash, install failure or timeout)
    Executed { exit_code: i32, timed_out: bool },
    /// The analyzer accepted the run
    AnalyzedSuccess,
    /// The analyzer diagnosed a failure
    AnalyzedFailure { classification: FailureKind },
    /// The analysis completion call failed
    AnalysisUnavailable { reason: String },
    /// The retry pause is over; re-enter generation
    Resumed,
}

/// Side effects the driver must perform after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run the current patch in the sandbox
    Execute,
    /// Analyze the captured execution outcome
    Analyze,
    /// Append one attempt record to the patch's history
    RecordAttempt,
    /// Re-invoke the generator with the diagnosis as prior context
    Regenerate,
    /// Re-invoke the generator after a generation failure
    RetryGeneration,
}

/// Pure state transition function
///
/// `max_attempts` is a hard ceiling: once attempt `max_attempts` has been
/// analyzed (or generation has failed that many times) every path leads to
/// a terminal state.
pub fn transition(
    state: LoopState,
    event: LoopEvent,
    max_attempts: u32,
) -> (LoopState, Vec<LoopAction>) {
    match (state, event) {
        (LoopState::Generating { attempt }, LoopEvent::Generated { .. }) => {
            (LoopState::Executing { attempt }, vec![LoopAction::Execute])
        }

        (LoopState::Generating { attempt }, LoopEvent::GenerationErrored { error }) => {
            if attempt < max_attempts {
                (
                    LoopState::Generating { attempt: attempt + 1 },
                    vec![LoopAction::RetryGeneration],
                )
            } else {
                (
                    LoopState::GenerationFailed {
                        attempts: attempt,
                        error,
                    },
                    vec![],
                )
            }
        }

        (LoopState::Executing { attempt }, LoopEvent::Executed { .. }) => {
            (LoopState::Analyzing { attempt }, vec![LoopAction::Analyze])
        }

        (LoopState::Analyzing { attempt }, LoopEvent::AnalyzedSuccess) => (
            LoopState::DoneSuccess { attempts: attempt },
            vec![LoopAction::RecordAttempt],
        ),

        (LoopState::Analyzing { attempt }, LoopEvent::AnalyzedFailure { .. }) => {
            if attempt < max_attempts {
                (
                    LoopState::Retrying { attempt },
                    vec![LoopAction::RecordAttempt],
                )
            } else {
                (
                    LoopState::DoneExhausted { attempts: attempt },
                    vec![LoopAction::RecordAttempt],
                )
            }
        }

        (LoopState::Analyzing { attempt }, LoopEvent::AnalysisUnavailable { .. }) => (
            LoopState::DoneAnalyzerUnavailable { attempts: attempt },
            vec![LoopAction::RecordAttempt],
        ),

        (LoopState::Retrying { attempt }, LoopEvent::Resumed) => (
            LoopState::Generating { attempt: attempt + 1 },
            vec![LoopAction::Regenerate],
        ),

        // Terminal states accept no events
        (state, event) if state.is_terminal() => (
            LoopState::Faulted {
                error: format!(
                    "invalid transition: terminal state {:?} received event {:?}",
                    state, event
                ),
            },
            vec![],
        ),

        // All other combinations are loop bugs
        (state, event) => (
            LoopState::Faulted {
                error: format!(
                    "invalid transition: state {:?} cannot handle event {:?}",
                    state, event
                ),
            },
            vec![],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u32 = 3;

    fn failure_event() -> LoopEvent {
        LoopEvent::AnalyzedFailure {
            classification: FailureKind::LogicError,
        }
    }

    #[test]
    fn test_happy_path_single_attempt() {
        let (state, actions) = transition(
            LoopState::Generating { attempt: 1 },
            LoopEvent::Generated { truncated: false },
            MAX,
        );
        assert_eq!(state, LoopState::Executing { attempt: 1 });
        assert_eq!(actions, vec![LoopAction::Execute]);

        let (state, actions) = transition(
            state,
            LoopEvent::Executed {
                exit_code: 0,
                timed_out: false,
            },
            MAX,
        );
        assert_eq!(state, LoopState::Analyzing { attempt: 1 });
        assert_eq!(actions, vec![LoopAction::Analyze]);

        let (state, actions) = transition(state, LoopEvent::AnalyzedSuccess, MAX);
        assert_eq!(state, LoopState::DoneSuccess { attempts: 1 });
        assert_eq!(actions, vec![LoopAction::RecordAttempt]);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failure_with_budget_goes_to_retrying() {
        let (state, actions) = transition(LoopState::Analyzing { attempt: 1 }, failure_event(), MAX);
        assert_eq!(state, LoopState::Retrying { attempt: 1 });
        assert_eq!(actions, vec![LoopAction::RecordAttempt]);

        let (state, actions) = transition(state, LoopEvent::Resumed, MAX);
        assert_eq!(state, LoopState::Generating { attempt: 2 });
        assert_eq!(actions, vec![LoopAction::Regenerate]);
    }

    #[test]
    fn test_failure_at_budget_exhausts() {
        let (state, actions) = transition(LoopState::Analyzing { attempt: MAX }, failure_event(), MAX);
        assert_eq!(state, LoopState::DoneExhausted { attempts: MAX });
        assert_eq!(actions, vec![LoopAction::RecordAttempt]);
    }

    #[test]
    fn test_bounded_retry_invariant_for_any_failure_sequence() {
        // Drive full failing cycles until terminal; count analyzed attempts
        let mut state = LoopState::Generating { attempt: 1 };
        let mut analyzed = 0;
        for _ in 0..100 {
            if state.is_terminal() {
                break;
            }
            state = match state {
                LoopState::Generating { .. } => {
                    transition(state, LoopEvent::Generated { truncated: false }, MAX).0
                }
                LoopState::Executing { .. } => transition(
                    state,
                    LoopEvent::Executed {
                        exit_code: 1,
                        timed_out: false,
                    },
                    MAX,
                )
                .0,
                LoopState::Analyzing { .. } => {
                    analyzed += 1;
                    transition(state, failure_event(), MAX).0
                }
                LoopState::Retrying { .. } => transition(state, LoopEvent::Resumed, MAX).0,
                terminal => terminal,
            };
        }
        assert_eq!(state, LoopState::DoneExhausted { attempts: MAX });
        assert_eq!(analyzed, MAX);
    }

    #[test]
    fn test_analyzer_unavailable_terminates_without_retry() {
        let (state, actions) = transition(
            LoopState::Analyzing { attempt: 1 },
            LoopEvent::AnalysisUnavailable {
                reason: "network down".to_string(),
            },
            MAX,
        );
        assert_eq!(state, LoopState::DoneAnalyzerUnavailable { attempts: 1 });
        assert_eq!(actions, vec![LoopAction::RecordAttempt]);
    }

    #[test]
    fn test_generation_error_retries_within_budget() {
        let (state, actions) = transition(
            LoopState::Generating { attempt: 1 },
            LoopEvent::GenerationErrored {
                error: "no code blocks".to_string(),
            },
            MAX,
        );
        assert_eq!(state, LoopState::Generating { attempt: 2 });
        assert_eq!(actions, vec![LoopAction::RetryGeneration]);
    }

    #[test]
    fn test_generation_error_at_budget_is_terminal() {
        let (state, _) = transition(
            LoopState::Generating { attempt: MAX },
            LoopEvent::GenerationErrored {
                error: "still nothing".to_string(),
            },
            MAX,
        );
        assert!(matches!(state, LoopState::GenerationFailed { attempts, .. } if attempts == MAX));
        assert!(state.is_terminal());
    }

    #[test]
    fn test_truncated_patch_still_proceeds_to_execution() {
        let (state, _) = transition(
            LoopState::Generating { attempt: 2 },
            LoopEvent::Generated { truncated: true },
            MAX,
        );
        assert_eq!(state, LoopState::Executing { attempt: 2 });
    }

    #[test]
    fn test_invalid_transition_never_panics() {
        let (state, actions) = transition(
            LoopState::Executing { attempt: 1 },
            LoopEvent::AnalyzedSuccess,
            MAX,
        );
        assert!(matches!(state, LoopState::Faulted { .. }));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_terminal_states_reject_all_events() {
        let done = LoopState::DoneSuccess { attempts: 1 };
        let (state, _) = transition(done, LoopEvent::Resumed, MAX);
        assert!(matches!(state, LoopState::Faulted { .. }));

        let exhausted = LoopState::DoneExhausted { attempts: 3 };
        let (state, _) = transition(exhausted, LoopEvent::AnalyzedSuccess, MAX);
        assert!(matches!(state, LoopState::Faulted { .. }));
    }

    #[test]
    fn test_attempts_accessor() {
        assert_eq!(LoopState::DoneSuccess { attempts: 2 }.attempts(), 2);
        assert_eq!(LoopState::Generating { attempt: 3 }.attempts(), 2);
        assert_eq!(
            LoopState::GenerationFailed {
                attempts: 3,
                error: "e".to_string()
            }
            .attempts(),
            3
        );
    }
}
