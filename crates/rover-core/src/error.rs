//! Unified error types for Rover

use thiserror::Error;

/// Unified error type for all Rover operations
#[derive(Error, Debug)]
pub enum RoverError {
    // Completion-model boundary errors
    #[error("Completion request failed: {0}")]
    Completion(String),

    #[error("Completion rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // Generator errors
    #[error("Code generation failed: {0}")]
    Generation(String),

    #[error("No parsable code blocks in completion response")]
    NoParsableCode {
        /// Raw completion text, kept for debugging
        raw: String,
    },

    // Sandbox errors
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Execution not supported for language: {0}")]
    UnsupportedExecution(String),

    // Artifact store errors
    #[error("Artifact store error: {0}")]
    Store(String),

    #[error("Patch not found: {0}")]
    PatchNotFound(String),

    #[error("Path validation failed: {0}")]
    PathValidation(String),

    // Configuration-level rejection (before the loop starts)
    #[error("Invalid task spec: {0}")]
    Spec(String),

    // VCS errors
    #[error("Git command failed: {0}")]
    Git(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using RoverError
pub type Result<T> = std::result::Result<T, RoverError>;
