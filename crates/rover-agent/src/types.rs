//! Type definitions for completion-model interactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claude model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Opus,
    #[default]
    Sonnet,
    Haiku,
}

impl Model {
    /// Get the API model name
    pub fn api_name(&self) -> &'static str {
        match self {
            Model::Opus => "claude-opus-4-20250514",
            Model::Sonnet => "claude-sonnet-4-5-20250929",
            Model::Haiku => "claude-haiku-3-5-20250929",
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::Opus => write!(f, "opus"),
            Model::Sonnet => write!(f, "sonnet"),
            Model::Haiku => write!(f, "haiku"),
        }
    }
}

impl std::str::FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "opus" => Ok(Model::Opus),
            "sonnet" => Ok(Model::Sonnet),
            "haiku" => Ok(Model::Haiku),
            _ => Err(format!("Invalid model: {}. Use opus, sonnet, or haiku.", s)),
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Result of a single completion call
#[derive(Debug, Clone)]
pub struct Completion {
    /// The model's output text
    pub text: String,
    /// Whether the response was cut off at the output-length bound
    pub truncated: bool,
    /// Token usage if reported
    pub usage: Option<Usage>,
    /// When the response arrived
    pub received_at: DateTime<Utc>,
}

/// Messages API request format
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub messages: Vec<ApiMessage>,
}

/// Message in a request
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    pub content: String,
}

/// Messages API response format
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiResponse {
    #[allow(dead_code)]
    pub id: String,
    pub content: Vec<ApiContent>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// Content block in a response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiContent {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub content_type: String,
    pub text: String,
}
