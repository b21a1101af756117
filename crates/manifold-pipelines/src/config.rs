//! Adapter configuration.
//!
//! Each adapter has its own configuration struct, read once from the
//! environment at construction time.  The host may later replace it through
//! the adapter's `update_config`, which also re-derives the HTTP headers.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::translate::REASONING_BUFFER_TOKENS;

/// Default Anthropic API base URL.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Default Fireworks inference API base URL.
pub const FIREWORKS_BASE_URL: &str = "https://api.fireworks.ai/inference/v1";

/// Default OpenRouter API base URL.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default extended-thinking budget, in tokens.
pub const DEFAULT_THINKING_BUDGET: u32 = 16_000;

/// Largest budget that still leaves room for `max_tokens` above it.
pub const MAX_THINKING_BUDGET: u32 = u32::MAX - REASONING_BUFFER_TOKENS;

// ---------------------------------------------------------------------------
// Anthropic
// ---------------------------------------------------------------------------

/// Configuration for the Anthropic adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Sent as `x-api-key`.  An empty key is passed through and rejected by
    /// the API with a 401.
    #[serde(default)]
    pub api_key: String,

    /// Token budget for reasoning-enabled model variants.
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: u32,

    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            thinking_budget: DEFAULT_THINKING_BUDGET,
            base_url: default_anthropic_base_url(),
        }
    }
}

impl AnthropicConfig {
    /// Read `ANTHROPIC_API_KEY` and `THINKING_BUDGET` from the process
    /// environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_var)
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let thinking_budget = match lookup("THINKING_BUDGET") {
            Some(raw) => raw.trim().parse().map_err(|e| PipelineError::Config {
                reason: format!("THINKING_BUDGET must be a non-negative integer: {e}"),
            })?,
            None => DEFAULT_THINKING_BUDGET,
        };
        if thinking_budget > MAX_THINKING_BUDGET {
            return Err(PipelineError::Config {
                reason: format!("THINKING_BUDGET must be at most {MAX_THINKING_BUDGET}"),
            });
        }

        Ok(Self {
            api_key: lookup("ANTHROPIC_API_KEY").unwrap_or_default(),
            thinking_budget,
            ..Self::default()
        })
    }
}

fn default_thinking_budget() -> u32 {
    DEFAULT_THINKING_BUDGET
}

fn default_anthropic_base_url() -> String {
    ANTHROPIC_BASE_URL.to_owned()
}

// ---------------------------------------------------------------------------
// Fireworks
// ---------------------------------------------------------------------------

/// Configuration for the Fireworks adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireworksConfig {
    /// Sent as a bearer token.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_fireworks_base_url")]
    pub base_url: String,
}

impl Default for FireworksConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_fireworks_base_url(),
        }
    }
}

impl FireworksConfig {
    /// Read `FIREWORKS_API_KEY` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_key: lookup("FIREWORKS_API_KEY").unwrap_or_default(),
            ..Self::default()
        }
    }
}

fn default_fireworks_base_url() -> String {
    FIREWORKS_BASE_URL.to_owned()
}

// ---------------------------------------------------------------------------
// OpenRouter
// ---------------------------------------------------------------------------

/// Configuration for the OpenRouter adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Sent as a bearer token.
    #[serde(default)]
    pub api_key: String,

    /// Sent as `HTTP-Referer` for OpenRouter's app attribution.
    #[serde(default)]
    pub site_url: String,

    /// Sent as `X-Title` for OpenRouter's app attribution.
    #[serde(default)]
    pub app_name: String,

    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,

    /// Seconds allowed to establish a connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: f64,

    /// Seconds allowed between reads of a response body.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Seconds a cached model catalog stays fresh.
    #[serde(default = "default_catalog_ttl_secs")]
    pub catalog_ttl_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            site_url: String::new(),
            app_name: String::new(),
            base_url: default_openrouter_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            catalog_ttl_secs: default_catalog_ttl_secs(),
        }
    }
}

impl OpenRouterConfig {
    /// Read `OPENROUTER_API_KEY`, `SITE_URL` and `APP_NAME` from the process
    /// environment.
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_key: lookup("OPENROUTER_API_KEY").unwrap_or_default(),
            site_url: lookup("SITE_URL").unwrap_or_default(),
            app_name: lookup("APP_NAME").unwrap_or_default(),
            ..Self::default()
        }
    }
}

fn default_openrouter_base_url() -> String {
    OPENROUTER_BASE_URL.to_owned()
}

fn default_connect_timeout_secs() -> f64 {
    3.05
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_catalog_ttl_secs() -> u64 {
    300
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn anthropic_defaults_without_env() {
        let config = AnthropicConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_key, "");
        assert_eq!(config.thinking_budget, 16_000);
        assert_eq!(config.base_url, "https://api.anthropic.com");
    }

    #[test]
    fn anthropic_reads_key_and_budget() {
        let config = AnthropicConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("THINKING_BUDGET", " 8000 "),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "sk-ant-test");
        assert_eq!(config.thinking_budget, 8000);
    }

    #[test]
    fn anthropic_rejects_non_numeric_budget() {
        let err = AnthropicConfig::from_lookup(lookup(&[("THINKING_BUDGET", "lots")]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }

    #[test]
    fn anthropic_rejects_budget_without_headroom() {
        let err = AnthropicConfig::from_lookup(lookup(&[("THINKING_BUDGET", "4294967000")]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));

        let top = MAX_THINKING_BUDGET.to_string();
        let config = AnthropicConfig::from_lookup(lookup(&[("THINKING_BUDGET", top.as_str())]))
            .unwrap();
        assert_eq!(config.thinking_budget, MAX_THINKING_BUDGET);
    }

    #[test]
    fn fireworks_reads_key() {
        let config = FireworksConfig::from_lookup(lookup(&[("FIREWORKS_API_KEY", "fw-test")]));
        assert_eq!(config.api_key, "fw-test");
        assert_eq!(config.base_url, "https://api.fireworks.ai/inference/v1");
    }

    #[test]
    fn openrouter_reads_attribution() {
        let config = OpenRouterConfig::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "or-test"),
            ("SITE_URL", "https://chat.example.com"),
            ("APP_NAME", "Example Chat"),
        ]));
        assert_eq!(config.api_key, "or-test");
        assert_eq!(config.site_url, "https://chat.example.com");
        assert_eq!(config.app_name, "Example Chat");
        assert_eq!(config.read_timeout_secs, 60);
        assert_eq!(config.catalog_ttl_secs, 300);
    }

    #[test]
    fn openrouter_deserializes_with_defaults() {
        let config: OpenRouterConfig = serde_json::from_str(r#"{"api_key":"k"}"#).unwrap();
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
        assert!((config.connect_timeout_secs - 3.05).abs() < f64::EPSILON);
    }
}
