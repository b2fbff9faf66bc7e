//! Canonical result model shared by the normalizers, the coordinator, and the report synthesizer.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A web-search-capable provider. Ordering is the report ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Message-block responses (schema A).
    Anthropic,
    /// Candidate/grounding responses (schema B).
    Gemini,
    /// Call/action responses (schema C).
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Anthropic, ProviderId::Gemini, ProviderId::OpenAi];

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderId::Anthropic => "Anthropic",
            ProviderId::Gemini => "Gemini",
            ProviderId::OpenAi => "OpenAI",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// General research with sources.
    #[default]
    #[value(alias = "search")]
    Basic,
    /// Fact-check the claims in the query.
    Verify,
    /// Multi-angle deep research.
    Deep,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchMode::Basic => "basic",
            SearchMode::Verify => "verify",
            SearchMode::Deep => "deep",
        })
    }
}

/// Which language's sources the providers should favour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[value(alias = "ko")]
    Primary,
    #[value(alias = "en")]
    Secondary,
    #[default]
    Both,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("at least one provider must be selected")]
    NoProviders,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    query: String,
    mode: SearchMode,
    language: Language,
    providers: BTreeSet<ProviderId>,
}

impl SearchRequest {
    pub fn new(
        query: &str,
        mode: SearchMode,
        language: Language,
        providers: impl IntoIterator<Item = ProviderId>,
    ) -> Result<Self, RequestError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RequestError::EmptyQuery);
        }
        let providers: BTreeSet<_> = providers.into_iter().collect();
        if providers.is_empty() {
            return Err(RequestError::NoProviders);
        }
        Ok(Self {
            query: query.to_string(),
            mode,
            language,
            providers,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn providers(&self) -> &BTreeSet<ProviderId> {
        &self.providers
    }
}

/// An inline reference tying generated text to a source.
///
/// `url` is empty only for document-internal citations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl Citation {
    /// Display dedup key: the url, or the title for document citations.
    pub fn dedup_key(&self) -> &str {
        if self.url.is_empty() {
            &self.title
        } else {
            &self.url
        }
    }
}

/// A page the provider consulted, whether or not it was cited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSource {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recency: Option<String>,
}

/// Maps a span of generated text to positions in the result's `sources`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingLink {
    pub excerpt_text: String,
    /// Raw positions as reported; may point past the source list.
    pub source_indices: Vec<i64>,
    /// Empty when the provider reported no scores.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub confidence: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_index: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub search_calls: u64,
    pub fetch_calls: u64,
}

impl UsageStats {
    pub fn is_empty(&self) -> bool {
        self.search_calls == 0 && self.fetch_calls == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Why a provider's unit of work failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Config,
    Network,
    Timeout,
    Api,
    Unexpected,
    Cancelled,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::Config => "configuration error",
            FailureKind::Network => "network error",
            FailureKind::Timeout => "timeout",
            FailureKind::Api => "provider API error",
            FailureKind::Unexpected => "unexpected error",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalResult {
    pub provider: ProviderId,
    pub status: ResultStatus,
    pub text: String,
    pub citations: Vec<Citation>,
    pub sources: Vec<SearchSource>,
    pub grounding_links: Vec<GroundingLink>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_queries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// The provider's response as received, kept only when the caller asks for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl CanonicalResult {
    /// An empty successful result, filled in by a normalizer.
    pub fn success(provider: ProviderId) -> Self {
        Self {
            provider,
            status: ResultStatus::Success,
            text: String::new(),
            citations: Vec::new(),
            sources: Vec::new(),
            grounding_links: Vec::new(),
            search_queries: Vec::new(),
            usage: None,
            error_message: None,
            failure_kind: None,
            raw: None,
        }
    }

    pub fn failure(provider: ProviderId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            error_message: Some(message.into()),
            failure_kind: Some(kind),
            ..Self::success(provider)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub query: String,
    pub mode: SearchMode,
    pub language: Language,
    pub generated_at: DateTime<Utc>,
    pub results: Vec<CanonicalResult>,
    pub success_count: usize,
    pub failure_count: usize,
    /// Urls surfaced by two or more successful providers, in first-seen order.
    pub cross_validated_urls: Vec<String>,
}

impl AggregateReport {
    /// Sorts `results` by provider and derives the counts.
    pub fn new(
        request: &SearchRequest,
        mut results: Vec<CanonicalResult>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        results.sort_by_key(|r| r.provider);
        let success_count = results.iter().filter(|r| r.is_success()).count();
        let failure_count = results.len() - success_count;
        let cross_validated_urls = cross_validated_urls(&results);
        Self {
            query: request.query().to_string(),
            mode: request.mode(),
            language: request.language(),
            generated_at,
            results,
            success_count,
            failure_count,
            cross_validated_urls,
        }
    }
}

/// Counts each exact url once per successful provider, across its sources and citations.
fn cross_validated_urls(results: &[CanonicalResult]) -> Vec<String> {
    let mut order = Vec::new();
    let mut providers: HashMap<&str, usize> = HashMap::new();

    for result in results.iter().filter(|r| r.is_success()) {
        let urls = result
            .sources
            .iter()
            .map(|s| s.url.as_str())
            .chain(result.citations.iter().map(|c| c.url.as_str()))
            .filter(|url| !url.is_empty());
        let mut seen = HashSet::new();
        for url in urls.filter(|url| seen.insert(*url)) {
            *providers.entry(url).or_insert_with(|| {
                order.push(url);
                0
            }) += 1;
        }
    }

    order
        .into_iter()
        .filter(|url| providers.get(url).is_some_and(|&n| n >= 2))
        .map(str::to_string)
        .collect()
}
