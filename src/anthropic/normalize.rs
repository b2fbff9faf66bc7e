use serde_json::Value;
use tracing::debug;

use crate::model::{CanonicalResult, Citation, ProviderId, SearchSource, UsageStats};

/// Walks the `content` blocks of a Messages API response.
///
/// `text` blocks contribute text and inline citations, `web_search_tool_result` blocks
/// contribute sources. Every other block kind is ignored. Missing fields resolve to empty values.
pub fn normalize(response: &Value) -> CanonicalResult {
    let mut result = CanonicalResult::success(ProviderId::Anthropic);
    let mut paragraphs = Vec::new();

    for block in response["content"].as_array().into_iter().flatten() {
        match block["type"].as_str() {
            Some("text") => {
                let text = block["text"].as_str().unwrap_or_default();
                if !text.trim().is_empty() {
                    paragraphs.push(text);
                }
                result.citations.extend(
                    block["citations"]
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(to_citation),
                );
            }
            Some("web_search_tool_result") => {
                result.sources.extend(
                    block["content"]
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter(|item| item["type"] == "web_search_result")
                        .map(|item| SearchSource {
                            url: string(&item["url"]),
                            title: string(&item["title"]),
                            recency: item["page_age"]
                                .as_str()
                                .filter(|age| !age.is_empty())
                                .map(str::to_string),
                        }),
                );
            }
            _ => {}
        }
    }

    result.text = paragraphs.join("\n");
    result.usage = response.get("usage").map(|usage| {
        let counters = &usage["server_tool_use"];
        UsageStats {
            search_calls: counters["web_search_requests"].as_u64().unwrap_or(0),
            fetch_calls: counters["web_fetch_requests"].as_u64().unwrap_or(0),
        }
    });

    debug!(
        citations = result.citations.len(),
        sources = result.sources.len(),
        "normalized anthropic response"
    );
    result
}

fn to_citation(citation: &Value) -> Option<Citation> {
    let excerpt = citation["cited_text"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    match citation["type"].as_str()? {
        "web_search_result_location" => Some(Citation {
            url: string(&citation["url"]),
            title: string(&citation["title"]),
            excerpt,
        }),
        "char_location" => Some(Citation {
            url: String::new(),
            title: string(&citation["document_title"]),
            excerpt,
        }),
        _ => None,
    }
}

fn string(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}
