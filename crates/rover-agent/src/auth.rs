//! Authentication for the completion API
//!
//! Two methods, checked in order:
//! 1. Claude Code OAuth token (CLAUDE_CODE_OAUTH_TOKEN)
//! 2. Anthropic API key (ANTHROPIC_API_KEY)

use rover_core::{Result, RoverError};
use std::env;

/// Resolve the API token from the environment
pub fn resolve_api_token() -> Result<String> {
    if let Ok(oauth_token) = env::var("CLAUDE_CODE_OAUTH_TOKEN") {
        tracing::debug!("Using Claude Code OAuth token");
        return Ok(oauth_token);
    }

    if let Ok(api_key) = env::var("ANTHROPIC_API_KEY") {
        tracing::debug!("Using ANTHROPIC_API_KEY");
        return Ok(api_key);
    }

    Err(RoverError::Auth(
        "No API credentials found. Set CLAUDE_CODE_OAUTH_TOKEN or ANTHROPIC_API_KEY.".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize access across tests
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap();

        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();
        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        result
    }

    #[test]
    fn test_oauth_token_takes_priority() {
        with_env_vars(
            &[
                ("CLAUDE_CODE_OAUTH_TOKEN", Some("oauth-token")),
                ("ANTHROPIC_API_KEY", Some("api-key")),
            ],
            || {
                assert_eq!(resolve_api_token().unwrap(), "oauth-token");
            },
        );
    }

    #[test]
    fn test_api_key_fallback() {
        with_env_vars(
            &[
                ("CLAUDE_CODE_OAUTH_TOKEN", None),
                ("ANTHROPIC_API_KEY", Some("api-key")),
            ],
            || {
                assert_eq!(resolve_api_token().unwrap(), "api-key");
            },
        );
    }

    #[test]
    fn test_no_credentials() {
        with_env_vars(
            &[("CLAUDE_CODE_OAUTH_TOKEN", None), ("ANTHROPIC_API_KEY", None)],
            || {
                assert!(matches!(resolve_api_token(), Err(RoverError::Auth(_))));
            },
        );
    }
}
