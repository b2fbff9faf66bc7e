use serde_json::Value;
use tracing::warn;

use crate::model::{CanonicalResult, GroundingLink, ProviderId, SearchSource};

/// Extracts the answer and grounding metadata from the first candidate.
///
/// Chunks without a URI are dropped; support indices are kept as reported and resolved
/// against the remaining sources at render time.
pub fn extract_grounded_result(response: &Value) -> CanonicalResult {
    let mut result = CanonicalResult::success(ProviderId::Gemini);
    let candidate = &response["candidates"][0];

    result.text = candidate["content"]["parts"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join("\n");

    if result.text.is_empty() {
        warn!("Gemini returned empty answer (safety filter or empty response)");
    }

    let metadata = &candidate["groundingMetadata"];

    result.search_queries = metadata["webSearchQueries"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    result.sources = metadata["groundingChunks"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|chunk| {
            let web = &chunk["web"];
            let url = web["uri"].as_str().filter(|u| !u.is_empty())?;
            Some(SearchSource {
                url: url.to_string(),
                title: web["title"].as_str().unwrap_or_default().to_string(),
                recency: None,
            })
        })
        .collect();

    result.grounding_links = metadata["groundingSupports"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|support| {
            let segment = &support["segment"];
            GroundingLink {
                excerpt_text: segment["text"].as_str().unwrap_or_default().to_string(),
                source_indices: support["groundingChunkIndices"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_i64)
                    .collect(),
                confidence: support["confidenceScores"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_f64)
                    .collect(),
                start_index: segment["startIndex"].as_u64(),
                end_index: segment["endIndex"].as_u64(),
            }
        })
        .collect();

    result
}
