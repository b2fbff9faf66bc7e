//! Provider transport: the authenticated HTTP call that yields a vendor's raw JSON response.

pub(crate) mod prompt;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::anthropic::client::AnthropicClient;
use crate::config::{ConfigError, ProviderSettings, ToolOptions};
use crate::gemini::client::GeminiClient;
use crate::model::{FailureKind, ProviderId, SearchRequest};
use crate::openai::client::OpenAiClient;

const ERROR_SNIPPET_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("API rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("API quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Network(#[from] reqwest::Error),

    #[error("response body is not valid JSON: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    #[error("provider call aborted: {0}")]
    Panicked(String),

    #[error("cancelled before the provider responded")]
    Cancelled,
}

impl ProviderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Config(_) => FailureKind::Config,
            ProviderError::RateLimited
            | ProviderError::QuotaExhausted(_)
            | ProviderError::Api { .. } => FailureKind::Api,
            ProviderError::Timeout(_) => FailureKind::Timeout,
            ProviderError::Network(_) => FailureKind::Network,
            ProviderError::InvalidResponse(_) | ProviderError::Panicked(_) => {
                FailureKind::Unexpected
            }
            ProviderError::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Human-readable message prefixed with the failure class.
    pub fn describe(&self) -> String {
        format!("{}: {self}", self.kind().label())
    }
}

/// Issues one provider call for a request and returns the raw response body.
/// Implemented by `HttpTransport` for production; mock implementations used in tests.
pub trait ProviderTransport {
    async fn call(
        &self,
        provider: ProviderId,
        request: &SearchRequest,
    ) -> Result<Value, ProviderError>;
}

/// One client per vendor. A vendor whose settings failed to resolve keeps the reason
/// and reports it on every call.
pub struct HttpTransport {
    anthropic: Result<AnthropicClient, ConfigError>,
    gemini: Result<GeminiClient, ConfigError>,
    openai: Result<OpenAiClient, ConfigError>,
}

impl HttpTransport {
    pub fn new(
        http: Client,
        settings: impl Fn(ProviderId) -> Result<ProviderSettings, ConfigError>,
        tools: &ToolOptions,
    ) -> Self {
        let resolve = |provider: ProviderId| {
            settings(provider).inspect_err(|e| warn!(%provider, "client not available: {e}"))
        };
        Self {
            anthropic: resolve(ProviderId::Anthropic)
                .map(|s| AnthropicClient::new(http.clone(), s, tools.clone())),
            gemini: resolve(ProviderId::Gemini)
                .map(|s| GeminiClient::new(http.clone(), s, tools.clone())),
            openai: resolve(ProviderId::OpenAi)
                .map(|s| OpenAiClient::new(http.clone(), s, tools.clone())),
        }
    }

    pub fn from_env(http: Client, tools: &ToolOptions) -> Self {
        Self::new(http, ProviderSettings::from_env, tools)
    }
}

impl ProviderTransport for HttpTransport {
    async fn call(
        &self,
        provider: ProviderId,
        request: &SearchRequest,
    ) -> Result<Value, ProviderError> {
        match provider {
            ProviderId::Anthropic => client(&self.anthropic)?.search(request).await,
            ProviderId::Gemini => client(&self.gemini)?.search(request).await,
            ProviderId::OpenAi => client(&self.openai)?.search(request).await,
        }
    }
}

fn client<C>(slot: &Result<C, ConfigError>) -> Result<&C, ProviderError> {
    slot.as_ref().map_err(|e| ProviderError::Config(e.clone()))
}

/// Sends a prepared request and classifies the outcome.
pub(crate) async fn send_json(
    provider: ProviderId,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<Value, ProviderError> {
    let response = request
        .header("User-Agent", crate::USER_AGENT)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify_reqwest(e, timeout))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!(%provider, "API rate limited");
        return Err(ProviderError::RateLimited);
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| error_message(&body))
            .unwrap_or_else(|| {
                let snippet: String = text.chars().take(ERROR_SNIPPET_CHARS).collect();
                format!("HTTP {status}: {snippet}")
            });
        warn!(%provider, status = %status, "API error");
        return Err(ProviderError::Api {
            code: status.as_u16(),
            message,
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| classify_reqwest(e, timeout))?;
    let body: Value = serde_json::from_str(&text).map_err(|e| {
        warn!(%provider, "response body is not JSON");
        ProviderError::InvalidResponse(e)
    })?;
    debug!(%provider, "response received");
    Ok(body)
}

fn classify_reqwest(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Network(e)
    }
}

/// Server-supplied message from an `{"error": {"message": ...}}` body, the shape all three vendors share.
pub(crate) fn error_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    error["message"]
        .as_str()
        .or_else(|| error.as_str())
        .map(str::to_string)
}
