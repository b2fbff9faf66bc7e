use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::types::{CitationsConfig, Message, MessagesRequest, ServerTool};
use crate::config::{ProviderSettings, ToolOptions, VendorDefaults};
use crate::model::{ProviderId, SearchRequest};
use crate::transport::{ProviderError, prompt, send_json};

pub static DEFAULTS: VendorDefaults = VendorDefaults {
    key_vars: &["ANTHROPIC_API_KEY"],
    model_var: "ANTHROPIC_MODEL",
    base_url_var: "ANTHROPIC_BASE_URL",
    timeout_var: "ANTHROPIC_TIMEOUT_SECS",
    model: "claude-sonnet-4-6",
    base_url: "https://api.anthropic.com",
    timeout: Duration::from_secs(180),
};

const API_VERSION: &str = "2023-06-01";
const DYNAMIC_FILTERING_BETA: &str = "code-execution-web-tools-2026-02-09";
const MAX_TOKENS: u32 = 4096;
const MAX_FETCH_USES: u32 = 5;

#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    settings: ProviderSettings,
    tools: ToolOptions,
}

impl AnthropicClient {
    pub fn new(http: Client, settings: ProviderSettings, tools: ToolOptions) -> Self {
        Self {
            http,
            settings,
            tools,
        }
    }

    fn build_request(&self, request: &SearchRequest) -> MessagesRequest {
        let dynamic = self.tools.dynamic_filtering;
        let domains = |list: &Vec<String>| (!list.is_empty()).then(|| list.clone());

        let mut tools = vec![ServerTool {
            kind: if dynamic {
                "web_search_20260209"
            } else {
                "web_search_20250305"
            },
            name: "web_search",
            max_uses: self.tools.max_searches,
            allowed_domains: domains(&self.tools.allowed_domains),
            blocked_domains: domains(&self.tools.blocked_domains),
            citations: None,
        }];

        if self.tools.enable_fetch {
            tools.push(ServerTool {
                kind: if dynamic {
                    "web_fetch_20260209"
                } else {
                    "web_fetch_20250910"
                },
                name: "web_fetch",
                max_uses: MAX_FETCH_USES,
                allowed_domains: domains(&self.tools.allowed_domains),
                blocked_domains: None,
                citations: Some(CitationsConfig { enabled: true }),
            });
        }

        MessagesRequest {
            model: self.settings.model.clone(),
            max_tokens: MAX_TOKENS,
            system: prompt::system_prompt(request.mode()).to_string(),
            messages: vec![Message {
                role: "user",
                content: prompt::user_query(
                    request.query(),
                    request.language(),
                    &self.tools.primary_language,
                ),
            }],
            tools,
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Value, ProviderError> {
        let url = format!("{}/v1/messages", self.settings.base_url);
        let body = self.build_request(request);

        let mut builder = self
            .http
            .post(&url)
            .header("x-api-key", self.settings.api_key.expose())
            .header("anthropic-version", API_VERSION)
            .json(&body);
        if self.tools.dynamic_filtering {
            builder = builder.header("anthropic-beta", DYNAMIC_FILTERING_BETA);
        }

        let response = send_json(ProviderId::Anthropic, builder, self.settings.timeout).await?;
        debug!(model = %self.settings.model, "anthropic search complete");
        Ok(response)
    }
}
