//! Per-vendor settings resolved from the environment, plus search tool options from the CLI.
//!
//! Environment variables (all optional; a vendor without a key fails on its own):
//! - `ANTHROPIC_API_KEY`, `ANTHROPIC_MODEL`, `ANTHROPIC_BASE_URL`, `ANTHROPIC_TIMEOUT_SECS`
//! - `GEMINI_API_KEY` (or `GOOGLE_API_KEY`), `GEMINI_MODEL`, `GEMINI_BASE_URL`, `GEMINI_TIMEOUT_SECS`
//! - `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL`, `OPENAI_TIMEOUT_SECS`

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::model::ProviderId;
use crate::{anthropic, gemini, openai};

/// Where a vendor looks for its settings and what it falls back to.
#[derive(Debug)]
pub struct VendorDefaults {
    pub key_vars: &'static [&'static str],
    pub model_var: &'static str,
    pub base_url_var: &'static str,
    pub timeout_var: &'static str,
    pub model: &'static str,
    pub base_url: &'static str,
    pub timeout: Duration,
}

pub fn vendor_defaults(provider: ProviderId) -> &'static VendorDefaults {
    match provider {
        ProviderId::Anthropic => &anthropic::client::DEFAULTS,
        ProviderId::Gemini => &gemini::client::DEFAULTS,
        ProviderId::OpenAi => &openai::client::DEFAULTS,
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} not set")]
    ApiKeyNotSet { var: &'static str },

    #[error("invalid {var} '{value}': {reason}")]
    InvalidBaseUrl {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: ApiKey,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn from_env(provider: ProviderId) -> Result<Self, ConfigError> {
        Self::from_lookup(provider, |var| env::var(var).ok())
    }

    pub fn from_lookup(
        provider: ProviderId,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = vendor_defaults(provider);
        let non_blank = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = defaults
            .key_vars
            .iter()
            .find_map(|var| non_blank(*var))
            .ok_or(ConfigError::ApiKeyNotSet {
                var: defaults.key_vars[0],
            })?;

        let model = non_blank(defaults.model_var).unwrap_or_else(|| defaults.model.to_string());

        let base_url = match non_blank(defaults.base_url_var) {
            Some(value) => validate_base_url(defaults.base_url_var, value)?,
            None => defaults.base_url.to_string(),
        };

        let timeout = non_blank(defaults.timeout_var)
            .and_then(|v| match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    warn!(var = defaults.timeout_var, value = %v, "ignoring invalid timeout");
                    None
                }
            })
            .unwrap_or(defaults.timeout);

        Ok(Self {
            api_key: ApiKey(api_key),
            model,
            base_url,
            timeout,
        })
    }
}

fn validate_base_url(var: &'static str, value: String) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        var,
        value: value.clone(),
        reason,
    };
    let parsed = url::Url::parse(&value).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(value.trim_end_matches('/').to_string()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

/// Search tool knobs shared by the vendor clients. Vendors ignore the ones they lack.
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Display name of the primary search language, e.g. "Korean".
    pub primary_language: String,
    pub max_searches: u32,
    pub allowed_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub enable_fetch: bool,
    pub dynamic_filtering: bool,
    /// ISO country code for approximate user location.
    pub country: Option<String>,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            primary_language: "Korean".to_string(),
            max_searches: 5,
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            enable_fetch: false,
            dynamic_filtering: false,
            country: None,
        }
    }
}
