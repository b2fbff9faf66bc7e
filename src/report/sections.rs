//! Per-provider body rendering: answer text followed by citation, source, grounding,
//! search-query, and usage sections.

use std::collections::HashSet;

use crate::markdown::{escape_md_inline, escape_md_link, truncate_chars};
use crate::model::{CanonicalResult, Citation, GroundingLink, SearchSource, UsageStats};

const EXCERPT_CHARS: usize = 150;
const GROUNDING_SPAN_CHARS: usize = 100;
const GROUNDING_TOP_K: usize = 10;
const EMPTY_ANSWER: &str = "(No answer returned.)";

pub fn render_result_body(result: &CanonicalResult) -> String {
    let mut out = if result.text.trim().is_empty() {
        EMPTY_ANSWER.to_string()
    } else {
        result.text.clone()
    };

    let mut sections = String::new();
    format_citations(&result.citations, &mut sections);
    format_sources(&result.sources, &mut sections);
    format_grounding(&result.grounding_links, &result.sources, &mut sections);
    format_search_queries(&result.search_queries, &mut sections);

    if !sections.is_empty() {
        out.push_str("\n\n---\n");
        out.push_str(&sections);
    }

    if let Some(usage) = result.usage.filter(|u| !u.is_empty()) {
        out.push('\n');
        out.push_str(&usage_line(&usage));
        out.push('\n');
    }

    out
}

fn link(title: &str, url: &str) -> String {
    format!("[{}]({})", escape_md_link(title), escape_md_link(url))
}

fn format_citations(citations: &[Citation], out: &mut String) {
    let mut seen = HashSet::new();
    let unique: Vec<_> = citations
        .iter()
        .filter(|c| !c.dedup_key().is_empty() && seen.insert(c.dedup_key()))
        .collect();
    if unique.is_empty() {
        return;
    }

    out.push_str("### Citations\n");
    for citation in unique {
        if citation.url.is_empty() {
            out.push_str(&format!("- {}\n", escape_md_inline(&citation.title)));
        } else {
            out.push_str(&format!("- {}\n", link(&citation.title, &citation.url)));
        }
        if let Some(excerpt) = citation.excerpt.as_deref().filter(|e| !e.is_empty()) {
            out.push_str(&format!("  > {}\n", truncate_chars(excerpt, EXCERPT_CHARS)));
        }
    }
    out.push('\n');
}

fn format_sources(sources: &[SearchSource], out: &mut String) {
    let mut seen = HashSet::new();
    let unique: Vec<_> = sources
        .iter()
        .filter(|s| !s.url.is_empty() && seen.insert(s.url.as_str()))
        .collect();
    if unique.is_empty() {
        return;
    }

    out.push_str("### Sources\n");
    for source in unique {
        out.push_str(&format!("- {}", link(&source.title, &source.url)));
        if let Some(recency) = &source.recency {
            out.push_str(&format!(" ({recency})"));
        }
        out.push('\n');
    }
    out.push('\n');
}

/// Indices are resolved against the undeduplicated `sources`; ones outside it are skipped.
fn format_grounding(links: &[GroundingLink], sources: &[SearchSource], out: &mut String) {
    if links.is_empty() {
        return;
    }

    out.push_str("### Grounding Supports\n");
    for support in links.iter().take(GROUNDING_TOP_K) {
        out.push_str(&format!(
            "- \"{}\"",
            truncate_chars(&support.excerpt_text, GROUNDING_SPAN_CHARS)
        ));
        if let Some(confidence) = average_confidence(&support.confidence) {
            out.push_str(&format!(" (confidence: {:.0}%)", confidence * 100.0));
        }
        out.push('\n');
        for source in resolve_sources(support, sources) {
            let label = if source.title.is_empty() {
                &source.url
            } else {
                &source.title
            };
            out.push_str(&format!("  <- {label}\n"));
        }
    }
    out.push('\n');
}

pub(crate) fn resolve_sources<'a>(
    link: &GroundingLink,
    sources: &'a [SearchSource],
) -> Vec<&'a SearchSource> {
    link.source_indices
        .iter()
        .filter_map(|&i| usize::try_from(i).ok())
        .filter_map(|i| sources.get(i))
        .collect()
}

/// `None` when no scores were reported; an empty list is not a zero-confidence claim.
fn average_confidence(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

fn format_search_queries(queries: &[String], out: &mut String) {
    if queries.is_empty() {
        return;
    }
    out.push_str("### Search Queries Used\n");
    for query in queries {
        out.push_str(&format!("- {query}\n"));
    }
    out.push('\n');
}

fn usage_line(usage: &UsageStats) -> String {
    format!(
        "_Usage: {} searches, {} fetches_",
        usage.search_calls, usage.fetch_calls
    )
}
