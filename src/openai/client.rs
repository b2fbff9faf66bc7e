use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::types::{DomainFilters, InputMessage, ResponsesRequest, UserLocation, WebSearchTool};
use crate::config::{ProviderSettings, ToolOptions, VendorDefaults};
use crate::model::{ProviderId, SearchRequest};
use crate::transport::{ProviderError, prompt, send_json};

pub static DEFAULTS: VendorDefaults = VendorDefaults {
    key_vars: &["OPENAI_API_KEY"],
    model_var: "OPENAI_MODEL",
    base_url_var: "OPENAI_BASE_URL",
    timeout_var: "OPENAI_TIMEOUT_SECS",
    model: "gpt-4.1",
    base_url: "https://api.openai.com",
    timeout: Duration::from_secs(120),
};

/// Asks the API to return the full source list of each search call.
const INCLUDE_SOURCES: &str = "web_search_call.action.sources";

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    settings: ProviderSettings,
    tools: ToolOptions,
}

impl OpenAiClient {
    pub fn new(http: Client, settings: ProviderSettings, tools: ToolOptions) -> Self {
        Self {
            http,
            settings,
            tools,
        }
    }

    fn build_request(&self, request: &SearchRequest) -> ResponsesRequest {
        let tool = WebSearchTool {
            kind: "web_search",
            filters: (!self.tools.allowed_domains.is_empty()).then(|| DomainFilters {
                allowed_domains: self.tools.allowed_domains.clone(),
            }),
            user_location: self.tools.country.as_ref().map(|country| UserLocation {
                kind: "approximate",
                country: country.clone(),
            }),
        };

        ResponsesRequest {
            model: self.settings.model.clone(),
            tools: vec![tool],
            include: vec![INCLUDE_SOURCES],
            input: vec![
                InputMessage {
                    role: "system",
                    content: prompt::system_prompt(request.mode()).to_string(),
                },
                InputMessage {
                    role: "user",
                    content: prompt::user_query(
                        request.query(),
                        request.language(),
                        &self.tools.primary_language,
                    ),
                },
            ],
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Value, ProviderError> {
        let url = format!("{}/v1/responses", self.settings.base_url);

        let builder = self
            .http
            .post(&url)
            .bearer_auth(self.settings.api_key.expose())
            .json(&self.build_request(request));

        let response = send_json(ProviderId::OpenAi, builder, self.settings.timeout).await?;
        debug!(model = %self.settings.model, "openai search complete");
        Ok(response)
    }
}
