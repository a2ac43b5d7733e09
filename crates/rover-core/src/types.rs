//! Core type definitions for Rover

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, RoverError};

/// Reserved exit code reported when execution is forcibly terminated
/// by the wall-clock timeout. Distinguishable from normal failure codes.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Target language of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    JavaScript,
    TypeScript,
    Go,
    Rust,
    Java,
    C,
    Cpp,
}

impl Language {
    /// Source file extension (without the dot)
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::JavaScript => "js",
            Self::TypeScript => "ts",
            Self::Go => "go",
            Self::Rust => "rs",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
        }
    }

    /// Name of the dependency manifest file, for languages where the
    /// sandbox can install declared packages
    pub fn manifest(&self) -> Option<&'static str> {
        match self {
            Self::Python => Some("requirements.txt"),
            _ => None,
        }
    }

    /// Whether declared package dependencies make sense for this language
    pub fn supports_packages(&self) -> bool {
        self.manifest().is_some()
    }

    /// Interpreter binary used to run the entry file, for languages the
    /// sandbox can execute directly
    pub fn interpreter(&self) -> Option<&'static str> {
        match self {
            Self::Python => Some("python3"),
            Self::JavaScript => Some("node"),
            _ => None,
        }
    }

    /// Default entry file name when the model does not label its output
    pub fn default_entry(&self) -> String {
        match self {
            Self::Java => "Main.java".to_string(),
            _ => format!("main.{}", self.extension()),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::JavaScript => write!(f, "javascript"),
            Self::TypeScript => write!(f, "typescript"),
            Self::Go => write!(f, "go"),
            Self::Rust => write!(f, "rust"),
            Self::Java => write!(f, "java"),
            Self::C => write!(f, "c"),
            Self::Cpp => write!(f, "cpp"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Self::Python),
            "javascript" | "js" => Ok(Self::JavaScript),
            "typescript" | "ts" => Ok(Self::TypeScript),
            "go" | "golang" => Ok(Self::Go),
            "rust" => Ok(Self::Rust),
            "java" => Ok(Self::Java),
            "c" => Ok(Self::C),
            "cpp" | "c++" => Ok(Self::Cpp),
            _ => Err(format!("Unsupported language: {}", s)),
        }
    }
}

/// A coding task submitted for generation
///
/// Immutable once handed to the generator for a given attempt; repair
/// passes reuse the same spec plus the prior diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Free-text task description
    pub description: String,
    /// Target language
    pub language: Language,
    /// Functional requirements, in order
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Declared package dependencies
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Free-text additional context
    #[serde(default)]
    pub context: Option<String>,
    /// Open-ended caller metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TaskSpec {
    pub fn new(description: impl Into<String>, language: Language) -> Self {
        Self {
            description: description.into(),
            language,
            requirements: Vec::new(),
            dependencies: Vec::new(),
            context: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_requirements(mut self, requirements: Vec<String>) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Validate the spec before it enters generation
    ///
    /// Rejects empty descriptions and dependency lists declared for
    /// languages with no package-manager support.
    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(RoverError::Spec("description must not be empty".to_string()));
        }
        if !self.dependencies.is_empty() && !self.language.supports_packages() {
            return Err(RoverError::Spec(format!(
                "language '{}' has no package manager support, but {} dependencies were declared",
                self.language,
                self.dependencies.len()
            )));
        }
        Ok(())
    }
}

/// Failure classification produced by the analyzer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// An import/require failed because a package is missing
    MissingDependency,
    /// The declared dependencies could not be installed
    DependencyInstall,
    /// The code ran but crashed or produced wrong behavior
    LogicError,
    /// Execution exceeded the wall-clock bound
    Timeout,
    /// The model produced output that does not run at all
    MalformedOutput,
    /// The generated source was cut off mid-file
    IncompleteSource,
    /// The analyzer could not map the failure to a known category
    #[default]
    Unclassified,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDependency => write!(f, "missing-dependency"),
            Self::DependencyInstall => write!(f, "dependency-install"),
            Self::LogicError => write!(f, "logic-error"),
            Self::Timeout => write!(f, "timeout"),
            Self::MalformedOutput => write!(f, "malformed-output"),
            Self::IncompleteSource => write!(f, "incomplete-source"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

impl std::str::FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "missing-dependency" | "missing_dependency" => Ok(Self::MissingDependency),
            "dependency-install" | "dependency_install" => Ok(Self::DependencyInstall),
            "logic-error" | "logic_error" => Ok(Self::LogicError),
            "timeout" => Ok(Self::Timeout),
            "malformed-output" | "malformed_output" => Ok(Self::MalformedOutput),
            "incomplete-source" | "incomplete_source" => Ok(Self::IncompleteSource),
            "unclassified" => Ok(Self::Unclassified),
            _ => Err(format!("Unknown failure classification: {}", s)),
        }
    }
}

/// Analyzer output for a failed attempt: classification plus fix guidance
///
/// Consumed by the repair loop as additional generation context; persisted
/// only inside its [`AttemptRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub classification: FailureKind,
    pub suggested_fix: String,
}

impl Diagnosis {
    pub fn new(classification: FailureKind, suggested_fix: impl Into<String>) -> Self {
        Self {
            classification,
            suggested_fix: suggested_fix.into(),
        }
    }
}

/// Analyzer verdict stored on an attempt record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    Failure,
    AnalyzerUnavailable,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::AnalyzerUnavailable => write!(f, "analyzer_unavailable"),
        }
    }
}

/// One execute/analyze cycle's outcome
///
/// Append-only: never edited after being written. Owned exclusively by its
/// patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error (or the synthetic timeout message)
    pub stderr: String,
    /// Process exit code ([`TIMEOUT_EXIT_CODE`] on timeout)
    pub exit_code: i32,
    /// Analyzer verdict
    pub verdict: Verdict,
    /// Diagnosis, present when the verdict is a failure with analysis
    #[serde(default)]
    pub diagnosis: Option<Diagnosis>,
    /// When this record was written
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(attempt: u32, outcome: &ExecutionOutcome, verdict: Verdict) -> Self {
        Self {
            attempt,
            stdout: outcome.stdout.clone(),
            stderr: outcome.stderr.clone(),
            exit_code: outcome.exit_code,
            verdict,
            diagnosis: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_diagnosis(mut self, diagnosis: Diagnosis) -> Self {
        self.diagnosis = Some(diagnosis);
        self
    }
}

/// Phase of sandbox execution an outcome belongs to
///
/// Install failures must be distinguishable from runtime crashes so the
/// next generation pass can target the dependency list instead of the
/// logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecPhase {
    /// Dependency environment provisioning / installation
    Install,
    /// Entry-file execution
    Run,
}

/// What the sandbox observed when running a patch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub phase: ExecPhase,
}

impl ExecutionOutcome {
    /// Outcome of a completed (not timed out) run
    pub fn run(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            timed_out: false,
            phase: ExecPhase::Run,
        }
    }

    /// Outcome of a failed dependency installation
    pub fn install_failure(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            timed_out: false,
            phase: ExecPhase::Install,
        }
    }

    /// Synthetic outcome for a forcibly terminated run
    pub fn timeout(timeout_secs: u64) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("execution timed out after {} seconds", timeout_secs),
            exit_code: TIMEOUT_EXIT_CODE,
            timed_out: true,
            phase: ExecPhase::Run,
        }
    }

    /// Whether the run finished cleanly
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && self.phase == ExecPhase::Run
    }
}

/// Result of analyzing one execution outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisResult {
    /// The run is good; stop here
    Success,
    /// The run failed; here is why and how to fix it
    Failed(Diagnosis),
    /// The analysis completion call itself failed
    Unavailable { reason: String },
}

/// Prior-attempt context handed to the generator on a repair pass
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    /// What went wrong last time
    pub diagnosis: &'a Diagnosis,
    /// The patch whose files are being regenerated
    pub previous: &'a Patch,
}

/// The unit of generated work: named source files, declared dependencies,
/// and an append-only execution history
///
/// Created by the generator; mutated in place by the repair loop (files
/// replaced on regeneration, attempts appended); read-only for the sandbox
/// and the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    /// Collision-resistant id: timestamp + slugified description + suffix.
    /// Doubles as the patch's directory name in the artifact store.
    pub id: String,
    pub language: Language,
    /// Task description inherited from the spec
    pub description: String,
    /// Free-text context inherited from the spec
    #[serde(default)]
    pub context: Option<String>,
    /// Relative path -> file content
    pub files: BTreeMap<String, String>,
    /// Declared package dependencies
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// The one canonical entry file (a key of `files`)
    pub entry_file: String,
    /// Set when the model response was cut off and the trailing file was
    /// kept best-effort
    #[serde(default)]
    pub truncated: bool,
    pub created_at: DateTime<Utc>,
    /// Execution history, strictly ordered, append-only
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
}

impl Patch {
    /// Build a fresh patch from a spec and extracted files
    pub fn new(
        spec: &TaskSpec,
        files: BTreeMap<String, String>,
        entry_file: String,
        truncated: bool,
    ) -> Self {
        Self {
            id: generate_patch_id(&spec.description),
            language: spec.language,
            description: spec.description.clone(),
            context: spec.context.clone(),
            files,
            dependencies: spec.dependencies.clone(),
            entry_file,
            truncated,
            created_at: Utc::now(),
            attempts: Vec::new(),
        }
    }

    /// Content of the entry file, if present
    pub fn entry_source(&self) -> Option<&str> {
        self.files.get(&self.entry_file).map(String::as_str)
    }

    /// The attempt number the next cycle will use (1-based)
    pub fn next_attempt(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }

    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }

    /// Append one attempt to the history
    pub fn record_attempt(&mut self, record: AttemptRecord) {
        self.attempts.push(record);
    }

    /// Replace the full file set on a regeneration pass
    ///
    /// Files from the prior attempt that the new response dropped are gone:
    /// a regeneration fully replaces the prior set.
    pub fn replace_files(
        &mut self,
        files: BTreeMap<String, String>,
        entry_file: String,
        truncated: bool,
    ) {
        self.files = files;
        self.entry_file = entry_file;
        self.truncated = truncated;
    }
}

/// Generate a collision-resistant patch id from a description
///
/// Format: `{utc timestamp}-{slug}-{random suffix}`. The timestamp keeps
/// listings chronological; the suffix covers same-second duplicates.
pub fn generate_patch_id(description: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..6];
    let slug = slugify(description);
    if slug.is_empty() {
        format!("{}-{}", timestamp, suffix)
    } else {
        format!("{}-{}-{}", timestamp, slug, suffix)
    }
}

/// Lowercase, alphanumeric-and-dash slug, capped at 40 characters
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in text.chars() {
        if slug.len() >= 40 {
            break;
        }
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("js".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!("C++".parse::<Language>().unwrap(), Language::Cpp);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_capabilities() {
        assert_eq!(Language::Python.manifest(), Some("requirements.txt"));
        assert!(Language::Python.supports_packages());
        assert!(!Language::Go.supports_packages());
        assert_eq!(Language::Python.interpreter(), Some("python3"));
        assert_eq!(Language::JavaScript.interpreter(), Some("node"));
        assert_eq!(Language::Rust.interpreter(), None);
    }

    #[test]
    fn test_spec_validation() {
        let spec = TaskSpec::new("reverse a string", Language::Python);
        assert!(spec.validate().is_ok());

        let empty = TaskSpec::new("   ", Language::Python);
        assert!(empty.validate().is_err());

        let bad_deps = TaskSpec::new("do things", Language::Go)
            .with_dependencies(vec!["leftpad".to_string()]);
        assert!(matches!(bad_deps.validate(), Err(RoverError::Spec(_))));
    }

    #[test]
    fn test_spec_dependencies_allowed_for_python() {
        let spec = TaskSpec::new("scrape a page", Language::Python)
            .with_dependencies(vec!["requests".to_string()]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Reverse a string!"), "reverse-a-string");
        assert_eq!(slugify("  weird__chars  "), "weird-chars");
        assert!(slugify(&"x".repeat(100)).len() <= 40);
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_patch_id_is_unique() {
        let a = generate_patch_id("same title");
        let b = generate_patch_id("same title");
        assert_ne!(a, b);
        assert!(a.contains("same-title"));
    }

    #[test]
    fn test_failure_kind_round_trip() {
        for kind in [
            FailureKind::MissingDependency,
            FailureKind::DependencyInstall,
            FailureKind::LogicError,
            FailureKind::Timeout,
            FailureKind::MalformedOutput,
            FailureKind::IncompleteSource,
            FailureKind::Unclassified,
        ] {
            let parsed: FailureKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_execution_outcome_constructors() {
        let ok = ExecutionOutcome::run("hi", "", 0);
        assert!(ok.succeeded());

        let timeout = ExecutionOutcome::timeout(5);
        assert!(!timeout.succeeded());
        assert_eq!(timeout.exit_code, TIMEOUT_EXIT_CODE);
        assert!(timeout.stderr.contains("timed out"));

        let install = ExecutionOutcome::install_failure("pip blew up", 1);
        assert!(!install.succeeded());
        assert_eq!(install.phase, ExecPhase::Install);
    }

    #[test]
    fn test_patch_replace_files_drops_old_set() {
        let spec = TaskSpec::new("demo", Language::Python);
        let mut files = BTreeMap::new();
        files.insert("main.py".to_string(), "print('v1')".to_string());
        files.insert("util.py".to_string(), "# helper".to_string());
        let mut patch = Patch::new(&spec, files, "main.py".to_string(), false);

        let mut next = BTreeMap::new();
        next.insert("main.py".to_string(), "print('v2')".to_string());
        patch.replace_files(next, "main.py".to_string(), false);

        assert_eq!(patch.files.len(), 1);
        assert_eq!(patch.entry_source(), Some("print('v2')"));
    }

    #[test]
    fn test_attempt_history_is_ordered() {
        let spec = TaskSpec::new("demo", Language::Python);
        let mut files = BTreeMap::new();
        files.insert("main.py".to_string(), "pass".to_string());
        let mut patch = Patch::new(&spec, files, "main.py".to_string(), false);

        assert_eq!(patch.next_attempt(), 1);
        let outcome = ExecutionOutcome::run("", "boom", 1);
        patch.record_attempt(AttemptRecord::new(1, &outcome, Verdict::Failure));
        assert_eq!(patch.next_attempt(), 2);
        patch.record_attempt(AttemptRecord::new(
            2,
            &ExecutionOutcome::run("done", "", 0),
            Verdict::Success,
        ));
        assert_eq!(patch.attempts.len(), 2);
        assert_eq!(patch.last_attempt().unwrap().verdict, Verdict::Success);
    }
}
