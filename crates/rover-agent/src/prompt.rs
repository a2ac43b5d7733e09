//! Prompt construction for generation, repair and analysis

use rover_core::{ExecutionOutcome, Language, Patch, RepairContext, TaskSpec};

/// Build the code-generation prompt for a spec
///
/// On a repair pass the prior source and the diagnosis are embedded, with an
/// explicit instruction to fix the identified issue while preserving
/// unrelated behavior.
pub fn build_generation_prompt(spec: &TaskSpec, repair: Option<&RepairContext<'_>>) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are a professional software developer. Write {} code that implements the following task.\n\n",
        spec.language
    ));
    prompt.push_str(&format!("Task: {}\n\n", spec.description));

    if !spec.requirements.is_empty() {
        prompt.push_str("Requirements:\n");
        for requirement in &spec.requirements {
            prompt.push_str(&format!("- {}\n", requirement));
        }
        prompt.push('\n');
    }

    if !spec.dependencies.is_empty() {
        prompt.push_str("Required packages:\n");
        for package in &spec.dependencies {
            prompt.push_str(&format!("- {}\n", package));
        }
        prompt.push('\n');
    }

    if let Some(context) = &spec.context {
        prompt.push_str(&format!("Additional context: {}\n\n", context));
    }

    if let Some(repair) = repair {
        prompt.push_str("## PREVIOUS ATTEMPT FAILED\n\n");
        prompt.push_str(&format!(
            "The previous implementation failed with classification '{}'.\n",
            repair.diagnosis.classification
        ));
        prompt.push_str(&format!(
            "Suggested fix: {}\n\n",
            repair.diagnosis.suggested_fix
        ));
        prompt.push_str("Previous source:\n\n");
        for (path, content) in &repair.previous.files {
            prompt.push_str(&format!("```{}\n{}\n```\n\n", path, content));
        }
        prompt.push_str(
            "Fix the identified issue while preserving unrelated behavior. \
             Output the COMPLETE corrected files, not a diff.\n\n",
        );
    }

    push_language_instructions(&mut prompt, spec.language);

    prompt.push_str(
        "Output each file in its own fenced code block with the relative file path \
         in the fence header, like:\n\
         ```main.py\n<code>\n```\n\n",
    );
    prompt.push_str(&format!(
        "Provide the complete {} implementation:\n",
        spec.language
    ));

    prompt
}

fn push_language_instructions(prompt: &mut String, language: Language) {
    match language {
        Language::Python => {
            prompt.push_str(
                "Write clean, well-documented Python code following PEP 8. \
                 Include docstrings and type hints. The entry file must run directly \
                 with `python main.py` and exit 0 on success.\n\
                 Also output a requirements.txt block listing ALL external packages \
                 needed to run the code, one per line, package names and versions \
                 only. Do NOT list standard library modules. If no external packages \
                 are needed, omit the requirements.txt block.\n\n",
            );
        }
        Language::JavaScript | Language::TypeScript => {
            prompt.push_str(
                "Write clean, modern JavaScript/TypeScript following standard style. \
                 Use ES6+ features where appropriate. The entry file must run directly \
                 with node and exit 0 on success.\n\n",
            );
        }
        Language::Go => {
            prompt.push_str(
                "Write idiomatic Go following the official style guide, with proper \
                 error handling and documentation.\n\n",
            );
        }
        Language::Rust => {
            prompt.push_str(
                "Write idiomatic Rust following the official style guide, with proper \
                 error handling and documentation.\n\n",
            );
        }
        Language::Java => {
            prompt.push_str(
                "Write clean Java following standard conventions, with JavaDoc \
                 comments and proper exception handling.\n\n",
            );
        }
        Language::C | Language::Cpp => {
            prompt.push_str(
                "Write clean, portable C/C++ with careful memory management and \
                 error handling.\n\n",
            );
        }
    }
}

/// Build the failure-analysis prompt for an execution outcome
pub fn build_analysis_prompt(patch: &Patch, outcome: &ExecutionOutcome) -> String {
    let mut prompt = String::new();

    prompt.push_str("You are an expert code reviewer. Code generated for the following task was executed and failed.\n\n");
    prompt.push_str(&format!("Task: {}\n", patch.description));
    prompt.push_str(&format!("Language: {}\n\n", patch.language));

    prompt.push_str("Source:\n\n");
    for (path, content) in &patch.files {
        prompt.push_str(&format!("```{}\n{}\n```\n\n", path, content));
    }

    prompt.push_str(&format!("Exit code: {}\n\n", outcome.exit_code));
    prompt.push_str("Standard output:\n```\n");
    prompt.push_str(&outcome.stdout);
    prompt.push_str("\n```\n\nStandard error:\n```\n");
    prompt.push_str(&outcome.stderr);
    prompt.push_str("\n```\n\n");

    prompt.push_str(
        "Classify the failure and propose a fix. Reply in EXACTLY this format, nothing else:\n\n\
         CLASSIFICATION: <one of: missing-dependency, dependency-install, logic-error, \
         timeout, malformed-output, incomplete-source, unclassified>\n\
         FIX: <specific guidance for regenerating the code without this failure>\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_core::{Diagnosis, FailureKind};
    use std::collections::BTreeMap;

    fn sample_spec() -> TaskSpec {
        TaskSpec::new("reverse a string and detect palindromes", Language::Python)
            .with_requirements(vec!["handle empty string".to_string()])
            .with_dependencies(vec!["requests".to_string()])
            .with_context("part of a text utility library")
    }

    fn sample_patch(spec: &TaskSpec) -> Patch {
        let mut files = BTreeMap::new();
        files.insert("main.py".to_string(), "print(1/0)".to_string());
        Patch::new(spec, files, "main.py".to_string(), false)
    }

    #[test]
    fn test_generation_prompt_includes_spec_fields() {
        let prompt = build_generation_prompt(&sample_spec(), None);
        assert!(prompt.contains("reverse a string"));
        assert!(prompt.contains("- handle empty string"));
        assert!(prompt.contains("- requests"));
        assert!(prompt.contains("text utility library"));
        assert!(prompt.contains("requirements.txt"));
        assert!(!prompt.contains("PREVIOUS ATTEMPT"));
    }

    #[test]
    fn test_repair_prompt_embeds_diagnosis_and_source() {
        let spec = sample_spec();
        let patch = sample_patch(&spec);
        let diagnosis = Diagnosis::new(FailureKind::LogicError, "guard against division by zero");
        let repair = RepairContext {
            diagnosis: &diagnosis,
            previous: &patch,
        };

        let prompt = build_generation_prompt(&spec, Some(&repair));
        assert!(prompt.contains("PREVIOUS ATTEMPT FAILED"));
        assert!(prompt.contains("logic-error"));
        assert!(prompt.contains("guard against division by zero"));
        assert!(prompt.contains("print(1/0)"));
        assert!(prompt.contains("preserving unrelated behavior"));
    }

    #[test]
    fn test_analysis_prompt_carries_output_and_exit_code() {
        let spec = sample_spec();
        let patch = sample_patch(&spec);
        let outcome = rover_core::ExecutionOutcome::run("", "ZeroDivisionError", 1);

        let prompt = build_analysis_prompt(&patch, &outcome);
        assert!(prompt.contains("Exit code: 1"));
        assert!(prompt.contains("ZeroDivisionError"));
        assert!(prompt.contains("CLASSIFICATION:"));
        assert!(prompt.contains("FIX:"));
    }
}
