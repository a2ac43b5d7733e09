//! Completion-model client
//!
//! One request/response text-completion call, parameterized by prompt,
//! output-length bound and sampling temperature. The upstream is treated as
//! unreliable: requests carry a timeout, rate limits and server errors are
//! retried with exponential backoff, and repeated hard failures trip a
//! breaker so the service fails fast instead of hanging on a dead API.

use crate::auth;
use crate::breaker::Breaker;
use crate::types::{ApiMessage, ApiRequest, ApiResponse, Completion, Model};
use async_trait::async_trait;
use chrono::Utc;
use rover_core::{Result, RoverError};
use std::sync::OnceLock;
use std::time::Duration;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_SECS: u64 = 5;
const MAX_BACKOFF_SECS: u64 = 60;

// Shared across all clients in the process
static BREAKER: OnceLock<Breaker> = OnceLock::new();

fn breaker() -> &'static Breaker {
    BREAKER.get_or_init(Breaker::default)
}

/// The completion-model boundary
///
/// Trait seam so the generator and analyzer can be driven by a scripted
/// mock in tests.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one completion call and return the model's text
    async fn complete(&self, prompt: &str, max_tokens: usize, temperature: f32)
        -> Result<Completion>;
}

/// HTTP client for the Anthropic Messages API
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    model: Model,
}

impl CompletionClient {
    pub fn new(model: Model) -> Self {
        Self::with_timeout(model, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    /// Create a client with a caller-specified request timeout
    pub fn with_timeout(model: Model, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { http, model }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    async fn send(&self, request: &ApiRequest) -> Result<Completion> {
        if !breaker().allow() {
            return Err(RoverError::Completion(format!(
                "breaker open after repeated API failures; retry in {}s",
                breaker().retry_after_ms() / 1000
            )));
        }

        let token = auth::resolve_api_token()?;

        let mut retries = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            tracing::debug!("Sending completion request (attempt {})", retries + 1);

            let response = self
                .http
                .post(API_URL)
                .header("x-api-key", &token)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .json(request)
                .send()
                .await
                .map_err(|e| RoverError::Completion(format!("request failed: {}", e)))?;

            let status = response.status();

            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RETRIES {
                    let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
                    return Err(RoverError::RateLimit(format!(
                        "still rate limited after {} retries: {}",
                        MAX_RETRIES, body
                    )));
                }

                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                tracing::warn!(
                    "Rate limited (429), waiting {}s before retry {}/{}",
                    wait_secs,
                    retries,
                    MAX_RETRIES
                );
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());

                if status.is_server_error() && retries < MAX_RETRIES {
                    retries += 1;
                    tracing::warn!(
                        "Server error ({}), waiting {}s before retry {}/{}",
                        status,
                        backoff_secs,
                        retries,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }

                breaker().trip();
                return Err(RoverError::Completion(format!(
                    "API error {}: {}",
                    status, body
                )));
            }

            let api_response: ApiResponse = response
                .json()
                .await
                .map_err(|e| RoverError::Completion(format!("unparsable response: {}", e)))?;

            let text = api_response
                .content
                .first()
                .map(|block| block.text.clone())
                .ok_or_else(|| RoverError::Completion("no content in response".to_string()))?;

            breaker().reset();

            let truncated = api_response.stop_reason.as_deref() == Some("max_tokens");
            if truncated {
                tracing::warn!("Completion hit the output-length bound; response may be cut off");
            }

            if let Some(usage) = &api_response.usage {
                tracing::info!(
                    "Completion done ({} chars, {} in / {} out tokens)",
                    text.len(),
                    usage.input_tokens,
                    usage.output_tokens
                );
            }

            return Ok(Completion {
                text,
                truncated,
                usage: api_response.usage,
                received_at: Utc::now(),
            });
        }
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<Completion> {
        let request = ApiRequest {
            model: self.model.api_name().to_string(),
            max_tokens,
            temperature,
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };
        self.send(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_holds_model() {
        let client = CompletionClient::new(Model::Haiku);
        assert_eq!(client.model(), Model::Haiku);
    }

    #[tokio::test]
    async fn test_complete_without_credentials_fails() {
        std::env::remove_var("CLAUDE_CODE_OAUTH_TOKEN");
        std::env::remove_var("ANTHROPIC_API_KEY");

        let client = CompletionClient::new(Model::Sonnet);
        let result = client.complete("hello", 64, 0.2).await;
        assert!(result.is_err());
    }
}
