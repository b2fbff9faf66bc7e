use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::model::{AggregateReport, CanonicalResult, ProviderId, SearchRequest};
use crate::transport::{ProviderError, ProviderTransport};
use crate::{anthropic, gemini, openai};

pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// Deadline for a single provider call, on top of the transport's own timeout.
    pub unit_timeout: Duration,
    /// Attach each provider's raw response to its result.
    pub keep_raw: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            unit_timeout: DEFAULT_UNIT_TIMEOUT,
            keep_raw: false,
        }
    }
}

/// Routes a raw response to the normalizer for its provider's schema.
pub fn normalize(provider: ProviderId, raw: &Value) -> CanonicalResult {
    match provider {
        ProviderId::Anthropic => anthropic::normalize::normalize(raw),
        ProviderId::Gemini => gemini::grounding::extract_grounded_result(raw),
        ProviderId::OpenAi => openai::normalize::normalize(raw),
    }
}

#[cfg_attr(not(test), allow(dead_code))]
pub async fn dispatch(
    transport: &impl ProviderTransport,
    request: &SearchRequest,
    options: DispatchOptions,
) -> AggregateReport {
    let (_never, cancel) = watch::channel(false);
    dispatch_with_cancel(transport, request, options, cancel).await
}

/// Calls every requested provider concurrently and waits for all of them.
///
/// Each provider resolves to exactly one result: a normalized success or an error entry.
/// Once `cancel` flips to `true`, providers still in flight resolve as cancelled.
pub async fn dispatch_with_cancel(
    transport: &impl ProviderTransport,
    request: &SearchRequest,
    options: DispatchOptions,
    cancel: watch::Receiver<bool>,
) -> AggregateReport {
    let providers: Vec<ProviderId> = request.providers().iter().copied().collect();
    let width = providers.len().max(1);

    let results: Vec<CanonicalResult> = stream::iter(providers)
        .map(|provider| run_unit(transport, provider, request, options, cancel.clone()))
        .buffer_unordered(width)
        .collect()
        .await;

    let report = AggregateReport::new(request, results, Utc::now());
    info!(
        succeeded = report.success_count,
        failed = report.failure_count,
        "dispatch complete"
    );
    report
}

async fn run_unit(
    transport: &impl ProviderTransport,
    provider: ProviderId,
    request: &SearchRequest,
    options: DispatchOptions,
    cancel: watch::Receiver<bool>,
) -> CanonicalResult {
    let started = Instant::now();
    debug!(%provider, "provider call started");

    let work = async {
        let raw = tokio::time::timeout(options.unit_timeout, transport.call(provider, request))
            .await
            .unwrap_or_else(|_| Err(ProviderError::Timeout(options.unit_timeout)))?;
        let mut result = normalize(provider, &raw);
        if options.keep_raw {
            result.raw = Some(raw);
        }
        Ok::<_, ProviderError>(result)
    };

    let outcome = tokio::select! {
        outcome = AssertUnwindSafe(work).catch_unwind() => {
            outcome.unwrap_or_else(|panic| Err(ProviderError::Panicked(panic_message(panic.as_ref()))))
        }
        () = cancelled(cancel) => Err(ProviderError::Cancelled),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(result) => {
            info!(%provider, elapsed_ms, "provider succeeded");
            result
        }
        Err(e) => {
            warn!(%provider, elapsed_ms, error = %e, "provider failed");
            CanonicalResult::failure(provider, e.kind(), e.describe())
        }
    }
}

/// Resolves once cancellation is requested. A dropped sender never cancels.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    if cancel.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic without message".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FailureKind, Language, ResultStatus, SearchMode};
    use crate::report::{OutputFormat, render};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Behavior {
        Respond(Value),
        Fail(fn() -> ProviderError),
        Hang,
        Panic,
        DelayThenRespond(Duration, Value),
    }

    struct MockTransport {
        behaviors: HashMap<ProviderId, Behavior>,
        calls: Mutex<Vec<ProviderId>>,
    }

    impl MockTransport {
        fn new(behaviors: impl IntoIterator<Item = (ProviderId, Behavior)>) -> Self {
            Self {
                behaviors: behaviors.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn captured_calls(&self) -> Vec<ProviderId> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProviderTransport for MockTransport {
        async fn call(
            &self,
            provider: ProviderId,
            _request: &SearchRequest,
        ) -> Result<Value, ProviderError> {
            self.calls.lock().unwrap().push(provider);
            match self.behaviors.get(&provider) {
                Some(Behavior::Respond(raw)) => Ok(raw.clone()),
                Some(Behavior::Fail(make)) => Err(make()),
                Some(Behavior::Hang) => std::future::pending().await,
                Some(Behavior::Panic) => panic!("transport exploded"),
                Some(Behavior::DelayThenRespond(delay, raw)) => {
                    tokio::time::sleep(*delay).await;
                    Ok(raw.clone())
                }
                None => Err(ProviderError::Api {
                    code: 500,
                    message: "no behavior".into(),
                }),
            }
        }
    }

    fn anthropic_response() -> Value {
        json!({"content": [{
            "type": "text",
            "text": "Anthropic answer",
            "citations": [
                {"type": "web_search_result_location", "url": "https://shared.com", "title": "Shared", "cited_text": "one"},
                {"type": "web_search_result_location", "url": "https://other.com", "title": "Other", "cited_text": "two"},
                {"type": "web_search_result_location", "url": "https://shared.com", "title": "Shared again", "cited_text": "three"}
            ]
        }]})
    }

    fn gemini_response() -> Value {
        json!({"candidates": [{
            "content": {"parts": [{"text": "Gemini answer"}]},
            "groundingMetadata": {
                "groundingChunks": [
                    {"web": {"uri": "https://g1.com", "title": "G1"}},
                    {"web": {"uri": "https://g2.com", "title": "G2"}},
                    {"web": {"uri": "https://g3.com", "title": "G3"}}
                ],
                "groundingSupports": [{
                    "segment": {"text": "Gemini answer"},
                    "groundingChunkIndices": [5]
                }]
            }
        }]})
    }

    fn openai_response() -> Value {
        json!({"output": [{"type": "message", "content": [
            {"type": "output_text", "text": "OpenAI answer", "annotations": []}
        ]}]})
    }

    fn request(providers: &[ProviderId]) -> SearchRequest {
        SearchRequest::new(
            "X",
            SearchMode::Basic,
            Language::Both,
            providers.iter().copied(),
        )
        .unwrap()
    }

    fn order(report: &AggregateReport) -> Vec<ProviderId> {
        report.results.iter().map(|r| r.provider).collect()
    }

    #[tokio::test]
    async fn one_result_per_provider_sorted() {
        let transport = MockTransport::new([
            (ProviderId::Anthropic, Behavior::DelayThenRespond(Duration::from_millis(60), anthropic_response())),
            (ProviderId::Gemini, Behavior::DelayThenRespond(Duration::from_millis(30), gemini_response())),
            (ProviderId::OpenAi, Behavior::Respond(openai_response())),
        ]);

        let report = dispatch(&transport, &request(&ProviderId::ALL), DispatchOptions::default()).await;

        assert_eq!(order(&report), ProviderId::ALL.to_vec());
        assert_eq!(report.success_count, 3);
        assert_eq!(report.failure_count, 0);
        assert_eq!(report.success_count + report.failure_count, report.results.len());
    }

    #[tokio::test]
    async fn only_requested_providers_are_called() {
        let transport = MockTransport::new([
            (ProviderId::Gemini, Behavior::Respond(gemini_response())),
            (ProviderId::OpenAi, Behavior::Respond(openai_response())),
        ]);

        let report = dispatch(
            &transport,
            &request(&[ProviderId::OpenAi, ProviderId::Gemini]),
            DispatchOptions::default(),
        )
        .await;

        assert_eq!(order(&report), vec![ProviderId::Gemini, ProviderId::OpenAi]);
        let mut calls = transport.captured_calls();
        calls.sort();
        assert_eq!(calls, vec![ProviderId::Gemini, ProviderId::OpenAi]);
    }

    #[tokio::test]
    async fn transport_failure_is_isolated() {
        let transport = MockTransport::new([
            (
                ProviderId::Anthropic,
                Behavior::Fail(|| {
                    ProviderError::Config(crate::config::ConfigError::ApiKeyNotSet {
                        var: "ANTHROPIC_API_KEY",
                    })
                }),
            ),
            (ProviderId::Gemini, Behavior::Respond(gemini_response())),
            (ProviderId::OpenAi, Behavior::Respond(openai_response())),
        ]);

        let report = dispatch(&transport, &request(&ProviderId::ALL), DispatchOptions::default()).await;

        let anthropic = &report.results[0];
        assert_eq!(anthropic.status, ResultStatus::Error);
        assert_eq!(anthropic.failure_kind, Some(FailureKind::Config));
        assert!(
            anthropic
                .error_message
                .as_deref()
                .unwrap()
                .starts_with("configuration error: ANTHROPIC_API_KEY")
        );
        assert!(anthropic.citations.is_empty() && anthropic.sources.is_empty());
        assert!(report.results[1].is_success());
        assert!(report.results[2].is_success());
    }

    #[tokio::test]
    async fn panicking_transport_becomes_unexpected_error() {
        let transport = MockTransport::new([
            (ProviderId::Anthropic, Behavior::Respond(anthropic_response())),
            (ProviderId::Gemini, Behavior::Panic),
        ]);

        let report = dispatch(
            &transport,
            &request(&[ProviderId::Anthropic, ProviderId::Gemini]),
            DispatchOptions::default(),
        )
        .await;

        let gemini = &report.results[1];
        assert_eq!(gemini.failure_kind, Some(FailureKind::Unexpected));
        assert!(gemini.error_message.as_deref().unwrap().contains("transport exploded"));
        assert!(report.results[0].is_success());
    }

    #[tokio::test]
    async fn hanging_provider_times_out_without_blocking_others() {
        let transport = MockTransport::new([
            (ProviderId::Anthropic, Behavior::Respond(anthropic_response())),
            (ProviderId::OpenAi, Behavior::Hang),
        ]);
        let options = DispatchOptions {
            unit_timeout: Duration::from_millis(50),
            ..DispatchOptions::default()
        };

        let report = dispatch(
            &transport,
            &request(&[ProviderId::Anthropic, ProviderId::OpenAi]),
            options,
        )
        .await;

        assert_eq!(report.success_count, 1);
        let openai = &report.results[1];
        assert_eq!(openai.failure_kind, Some(FailureKind::Timeout));
        assert!(openai.error_message.as_deref().unwrap().starts_with("timeout:"));
    }

    #[tokio::test]
    async fn cancellation_keeps_finished_results() {
        let transport = MockTransport::new([
            (ProviderId::Anthropic, Behavior::Respond(anthropic_response())),
            (ProviderId::Gemini, Behavior::Hang),
            (ProviderId::OpenAi, Behavior::Hang),
        ]);
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let report = dispatch_with_cancel(
            &transport,
            &request(&ProviderId::ALL),
            DispatchOptions::default(),
            rx,
        )
        .await;

        assert_eq!(report.results.len(), 3);
        assert!(report.results[0].is_success());
        assert_eq!(report.results[1].failure_kind, Some(FailureKind::Cancelled));
        assert_eq!(report.results[2].failure_kind, Some(FailureKind::Cancelled));
    }

    #[tokio::test]
    async fn scenario_mixed_outcomes_render_cleanly() {
        let transport = MockTransport::new([
            (ProviderId::Anthropic, Behavior::Respond(anthropic_response())),
            (ProviderId::Gemini, Behavior::Respond(gemini_response())),
            (
                ProviderId::OpenAi,
                Behavior::Fail(|| ProviderError::Timeout(Duration::from_secs(120))),
            ),
        ]);

        let report = dispatch(&transport, &request(&ProviderId::ALL), DispatchOptions::default()).await;

        assert_eq!(order(&report), ProviderId::ALL.to_vec());
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failure_count, 1);
        assert_eq!(report.results[2].failure_kind, Some(FailureKind::Timeout));

        let markdown = render(&report, OutputFormat::Markdown).unwrap();
        assert_eq!(markdown.matches("https://shared.com").count(), 1);
        assert!(markdown.contains("https://other.com"));
        assert!(markdown.contains("\"Gemini answer\""));
        assert!(!markdown.contains("  <- "), "out-of-range index must not resolve");
        assert!(markdown.contains("**OpenAI**: timeout"));
    }

    #[tokio::test]
    async fn raw_response_kept_only_on_request() {
        let transport = MockTransport::new([(ProviderId::OpenAi, Behavior::Respond(openai_response()))]);
        let req = request(&[ProviderId::OpenAi]);

        let plain = dispatch(&transport, &req, DispatchOptions::default()).await;
        assert!(plain.results[0].raw.is_none());

        let options = DispatchOptions {
            keep_raw: true,
            ..DispatchOptions::default()
        };
        let kept = dispatch(&transport, &req, options).await;
        assert_eq!(kept.results[0].raw, Some(openai_response()));
        assert_eq!(kept.results[0].text, "OpenAI answer");
    }

    #[tokio::test]
    async fn providers_sharing_a_url_are_cross_validated() {
        let gemini = json!({"candidates": [{
            "content": {"parts": [{"text": "Gemini answer"}]},
            "groundingMetadata": {"groundingChunks": [{"web": {"uri": "https://shared.com", "title": "Shared"}}]}
        }]});
        let transport = MockTransport::new([
            (ProviderId::Anthropic, Behavior::Respond(anthropic_response())),
            (ProviderId::Gemini, Behavior::Respond(gemini)),
        ]);

        let report = dispatch(
            &transport,
            &request(&[ProviderId::Anthropic, ProviderId::Gemini]),
            DispatchOptions::default(),
        )
        .await;

        assert_eq!(report.cross_validated_urls, vec!["https://shared.com"]);
        let markdown = render(&report, OutputFormat::Markdown).unwrap();
        assert!(markdown.contains("## 🔗 Cross-Validated Sources\n\n- https://shared.com\n"));
    }

    #[test]
    fn normalize_routes_by_provider() {
        assert_eq!(
            normalize(ProviderId::OpenAi, &json!({})).text,
            openai::normalize::EMPTY_RESPONSE
        );
        assert_eq!(normalize(ProviderId::Gemini, &json!({})).provider, ProviderId::Gemini);
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "panic without message");
    }
}
