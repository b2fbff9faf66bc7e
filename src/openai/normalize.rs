use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{CanonicalResult, Citation, ProviderId, SearchSource};

/// Text used when a response has no `output` field at all.
pub const EMPTY_RESPONSE: &str = "(No response content returned.)";

/// Walks the `output` items of a Responses API response.
///
/// `web_search_call` items contribute the sources of their action; `message` items
/// contribute `output_text` parts and their `url_citation` annotations.
pub fn normalize(response: &Value) -> CanonicalResult {
    let mut result = CanonicalResult::success(ProviderId::OpenAi);

    let Some(output) = response.get("output") else {
        warn!("OpenAI response has no output field");
        result.text = EMPTY_RESPONSE.to_string();
        return result;
    };

    let mut texts = Vec::new();

    for item in output.as_array().into_iter().flatten() {
        match item["type"].as_str() {
            Some("web_search_call") => {
                result.sources.extend(
                    item["action"]["sources"]
                        .as_array()
                        .into_iter()
                        .flatten()
                        .map(|source| SearchSource {
                            url: string(&source["url"]),
                            title: string(&source["title"]),
                            recency: None,
                        }),
                );
            }
            Some("message") => {
                let parts = item["content"].as_array().into_iter().flatten();
                for part in parts.filter(|p| p["type"] == "output_text") {
                    texts.push(part["text"].as_str().unwrap_or_default());
                    result.citations.extend(
                        part["annotations"]
                            .as_array()
                            .into_iter()
                            .flatten()
                            .filter(|a| a["type"] == "url_citation")
                            .map(|a| Citation {
                                url: string(&a["url"]),
                                title: string(&a["title"]),
                                excerpt: None,
                            }),
                    );
                }
            }
            _ => {}
        }
    }

    result.text = texts.join("\n");
    debug!(
        citations = result.citations.len(),
        sources = result.sources.len(),
        "normalized openai response"
    );
    result
}

fn string(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}
