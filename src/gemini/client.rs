use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{Content, GenerateContentRequest, GoogleSearch, Part, Tool};
use crate::config::{ProviderSettings, ToolOptions, VendorDefaults};
use crate::model::{ProviderId, SearchRequest};
use crate::transport::{ProviderError, error_message, prompt, send_json};

pub static DEFAULTS: VendorDefaults = VendorDefaults {
    key_vars: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
    model_var: "GEMINI_MODEL",
    base_url_var: "GEMINI_BASE_URL",
    timeout_var: "GEMINI_TIMEOUT_SECS",
    model: "gemini-2.5-flash",
    base_url: "https://generativelanguage.googleapis.com/v1beta/models",
    timeout: Duration::from_secs(120),
};

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    settings: ProviderSettings,
    tools: ToolOptions,
}

impl GeminiClient {
    pub fn new(http: Client, settings: ProviderSettings, tools: ToolOptions) -> Self {
        Self {
            http,
            settings,
            tools,
        }
    }

    fn build_request(&self, request: &SearchRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content {
                parts: vec![Part {
                    text: prompt::system_prompt(request.mode()).to_string(),
                }],
                role: None,
            },
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt::user_query(
                        request.query(),
                        request.language(),
                        &self.tools.primary_language,
                    ),
                }],
                role: Some("user".to_string()),
            }],
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Value, ProviderError> {
        let url = format!(
            "{}/{}:generateContent",
            self.settings.base_url, self.settings.model
        );

        let builder = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.settings.api_key.expose())
            .json(&self.build_request(request));

        let body = send_json(ProviderId::Gemini, builder, self.settings.timeout).await?;

        if body.get("error").is_some() {
            let classified = classify_api_error(&body);
            warn!(error = %classified, "Gemini API error in 200 response");
            return Err(classified);
        }

        debug!(model = %self.settings.model, "gemini search complete");
        Ok(body)
    }
}

fn classify_api_error(body: &Value) -> ProviderError {
    let message = error_message(body).unwrap_or_else(|| "Unknown error".to_string());

    match body["error"]["code"].as_u64() {
        Some(429) => ProviderError::RateLimited,
        Some(403) => ProviderError::QuotaExhausted(message),
        Some(code) => ProviderError::Api {
            code: u16::try_from(code).unwrap_or(0),
            message,
        },
        None => ProviderError::Api {
            code: 0,
            message: format!("Unknown error (no status code): {message}"),
        },
    }
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use crate::model::{Language, SearchMode};
    use wiremock::matchers::{body_partial_json, header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> GeminiClient {
        let settings = ProviderSettings::from_lookup(ProviderId::Gemini, |var| match var {
            "GEMINI_API_KEY" => Some("test-key".into()),
            "GEMINI_BASE_URL" => Some(base_url.into()),
            _ => None,
        })
        .unwrap();
        GeminiClient::new(Client::new(), settings, ToolOptions::default())
    }

    fn request() -> SearchRequest {
        SearchRequest::new("test", SearchMode::Basic, Language::Both, [ProviderId::Gemini])
            .unwrap()
    }

    #[tokio::test]
    async fn search_success_returns_raw_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/gemini-2\.5-flash:generateContent$"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "tools": [{"google_search": {}}],
                "contents": [{"role": "user"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [{"text": "Test answer"}],
                        "role": "model"
                    },
                    "groundingMetadata": {
                        "groundingChunks": [{
                            "web": {
                                "uri": "https://example.com",
                                "title": "Example"
                            }
                        }]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let raw = client(&server.uri()).search(&request()).await.unwrap();

        assert_eq!(
            raw["candidates"][0]["content"]["parts"][0]["text"],
            "Test answer"
        );
    }

    #[tokio::test]
    async fn search_429_returns_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = client(&server.uri()).search(&request()).await;
        assert!(matches!(result, Err(ProviderError::RateLimited)));
    }

    #[tokio::test]
    async fn search_500_with_error_body_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {
                    "code": 500,
                    "message": "Internal server error"
                }
            })))
            .mount(&server)
            .await;

        let result = client(&server.uri()).search(&request()).await;
        match &result {
            Err(ProviderError::Api { code: 500, message }) => {
                assert!(message.contains("Internal server error"));
            }
            other => panic!("expected Api(500) with body message, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_500_with_invalid_body_returns_snippet() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(500).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = client(&server.uri()).search(&request()).await;
        match &result {
            Err(ProviderError::Api { code: 500, message }) => {
                assert!(message.contains("not json"), "expected body snippet in error, got: {message}");
            }
            other => panic!("expected Api(500) without body, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_200_with_error_field_returns_classified_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {
                    "code": 403,
                    "message": "Quota exceeded"
                }
            })))
            .mount(&server)
            .await;

        let result = client(&server.uri()).search(&request()).await;
        assert!(matches!(result, Err(ProviderError::QuotaExhausted(_))));
    }
}
