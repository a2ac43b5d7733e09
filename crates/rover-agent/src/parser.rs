//! Source extraction from completion responses
//!
//! The generation prompt asks for one fenced code block per file, with the
//! file path in the fence header (```main.py). Models do not reliably obey:
//! headers may be bare language tags, blocks may be duplicated, thinking
//! spans may wrap everything, and long responses get cut off mid-file when
//! they hit the output-length bound. Parsing is therefore lenient - a
//! missing closing fence keeps the best-effort content and flags the result
//! as truncated instead of discarding it, because partial code is still
//! diagnosable on the next pass.

use rover_core::Language;
use std::collections::BTreeMap;

/// Files extracted from one completion response
#[derive(Debug, Clone, Default)]
pub struct ParsedSources {
    /// Relative path -> content
    pub files: BTreeMap<String, String>,
    /// Set when the trailing block had no closing fence
    pub truncated: bool,
}

impl ParsedSources {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Extract labeled source files from a completion response
pub fn extract_sources(response: &str, language: Language) -> ParsedSources {
    let text = strip_thinking(response);
    let mut parsed = ParsedSources::default();

    let mut pos = 0;
    while let Some(offset) = text[pos..].find("```") {
        let fence_start = pos + offset + 3;
        let header_end = text[fence_start..]
            .find('\n')
            .map(|i| fence_start + i)
            .unwrap_or(text.len());
        let header = text[fence_start..header_end].trim();

        if header_end >= text.len() {
            // Response ended inside the fence header
            parsed.truncated = true;
            break;
        }

        let body_start = header_end + 1;
        let (content, next_pos) = match text[body_start..].find("\n```") {
            Some(close) => {
                let content = &text[body_start..body_start + close];
                // Skip past the closing fence line
                let after_fence = body_start + close + 4;
                let next = text[after_fence..]
                    .find('\n')
                    .map(|i| after_fence + i + 1)
                    .unwrap_or(text.len());
                (content, next)
            }
            None => {
                // No closing fence: keep everything up to the cut-off
                parsed.truncated = true;
                (&text[body_start..], text.len())
            }
        };

        let content = content.trim();
        if !content.is_empty() {
            let name = block_file_name(header, content, language);
            parsed.files.insert(name, content.to_string());
        }

        pos = next_pos;
        if pos >= text.len() {
            break;
        }
    }

    parsed
}

/// Map a fence header to a file name
///
/// Headers carrying a path (`main.py`, `src/app.py`, `python main.py`) name
/// the file directly; bare language tags fall back to a conventional
/// default; an unrecognizable header becomes the single default entry file.
fn block_file_name(header: &str, content: &str, language: Language) -> String {
    // Any token that looks like a path wins over a language tag
    for token in header.split_whitespace() {
        if token.contains('/') || token.contains('.') {
            return token.trim_start_matches("./").to_string();
        }
    }

    let tag = header
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();

    match tag.as_str() {
        "python" | "py" => "main.py".to_string(),
        "javascript" | "js" => "main.js".to_string(),
        "typescript" | "ts" => "main.ts".to_string(),
        "go" | "golang" => "main.go".to_string(),
        "rust" => "main.rs".to_string(),
        "java" => "Main.java".to_string(),
        "c" => "main.c".to_string(),
        "cpp" | "c++" => "main.cpp".to_string(),
        "html" => "index.html".to_string(),
        "css" => "style.css".to_string(),
        "json" => "config.json".to_string(),
        "text" | "txt" | "plaintext" | "requirements" => "requirements.txt".to_string(),
        _ if looks_like_requirements(content) => "requirements.txt".to_string(),
        _ => language.default_entry(),
    }
}

/// Untagged blocks of bare package lines are almost always the manifest
fn looks_like_requirements(content: &str) -> bool {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    !lines.is_empty()
        && lines.iter().all(|line| {
            !line.contains(' ')
                && line
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_.=<>!~[],".contains(c))
                && line.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        })
        && lines.len() <= 20
}

/// Remove `<think>...</think>` spans some models prepend to their output
fn strip_thinking(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut remaining = text;

    while let Some(start) = remaining.find("<think>") {
        result.push_str(&remaining[..start]);
        match remaining[start..].find("</think>") {
            Some(end) => remaining = &remaining[start + end + "</think>".len()..],
            None => return result,
        }
    }
    result.push_str(remaining);
    result
}

/// Parse a requirements manifest body into dependency entries
pub fn parse_requirement_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with('#') && !line.starts_with("pip install")
        })
        .map(str::to_string)
        .collect()
}
