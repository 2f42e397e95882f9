//! Request router — the per-request composition point.
//!
//! For each inbound chat call: validate → classify → select → consult
//! the cache → (on a miss) abuse and quota checks → stream through the
//! failover orchestrator → populate the cache and record usage.
//!
//! The caller receives a stream of [`RouteEvent`]s: one `metadata`
//! event, zero or more `chunk`s, and exactly one terminal `done` or
//! `error`. Policy rejections (quota, abuse, suspension) and input
//! errors return as `Err` from [`ChatRouter::chat`] before any event
//! is emitted. Dropping the stream cancels the in-flight upstream
//! call.
//!
//! Cache writes and usage-counter updates after a successful response
//! are best-effort: a persistence failure is logged, never surfaced to
//! the caller.

mod builder;

pub use builder::RouterBuilder;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, CacheStats, CachedResponse, ResponseCache};
use crate::catalog::ModelCatalog;
use crate::classify::analyze_prompt;
use crate::guard::{QuotaGuard, UsageStore};
use crate::providers::{FailoverOrchestrator, bounded_stream};
use crate::select::{Selection, select_model};
use crate::telemetry;
use crate::types::{ChatRequest, LimitKind, ProviderEvent, RouteEvent, Turn, Usage};
use crate::{ModelmuxError, Result};

/// Stream of caller-facing events for one routed request.
pub type RouteStream = Pin<Box<dyn Stream<Item = RouteEvent> + Send>>;

/// Routes chat requests across providers with caching, quota
/// enforcement, and failover.
///
/// Construct via [`ChatRouter::builder`]. All shared parts are
/// explicitly injected, so tests instantiate isolated routers instead
/// of sharing process-wide state.
pub struct ChatRouter {
    pub(crate) catalog: Arc<ModelCatalog>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) guard: Arc<QuotaGuard>,
    pub(crate) store: Arc<dyn UsageStore>,
    pub(crate) orchestrator: FailoverOrchestrator,
    pub(crate) temperature: f32,
    pub(crate) stream_buffer: usize,
}

impl std::fmt::Debug for ChatRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRouter")
            .field("temperature", &self.temperature)
            .field("stream_buffer", &self.stream_buffer)
            .finish_non_exhaustive()
    }
}

impl ChatRouter {
    /// Create a builder for configuring a router.
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Current response-cache statistics (read-only admin surface).
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The catalog this router routes over.
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Spawn the periodic cache sweeper on the current runtime.
    pub fn start_cache_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.cache.spawn_sweeper()
    }

    /// Route one chat request.
    ///
    /// Input and policy errors return as `Err` before any event is
    /// emitted; rate-limit denials carry the limit kind and a
    /// retry-after. On success the returned stream yields `metadata`,
    /// `chunk`s, and a terminal `done`/`error`.
    #[instrument(skip(self, request), fields(account = %request.account_id))]
    pub async fn chat(&self, request: ChatRequest) -> Result<RouteStream> {
        let started = Instant::now();

        let prompt = request.message.trim().to_string();
        if prompt.is_empty() {
            return Err(ModelmuxError::InvalidInput("empty prompt".into()));
        }
        if request.trial_remaining == Some(0) {
            return Err(ModelmuxError::QuotaExceeded {
                reason: "anonymous trial allowance exhausted".into(),
                limit_kind: LimitKind::Trial,
                retry_after: None,
            });
        }

        let analysis = analyze_prompt(&prompt);
        let snapshot = self.guard.snapshot(&request.account_id).await?;
        let has_credit = self.guard.has_premium_credit(&snapshot);

        let exhausted = self.exhausted_models().await;
        let exhausted_refs: Vec<&str> = exhausted.iter().map(String::as_str).collect();
        let selection = select_model(
            &self.catalog,
            &analysis,
            snapshot.tier,
            &request.history,
            has_credit,
            &exhausted_refs,
        );
        debug!(
            model = %selection.model.id,
            category = %selection.category,
            premium = selection.is_premium,
            "model selected"
        );

        let key = ResponseCache::key(&selection.model.id, &prompt, &request.history);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(self.serve_cached(request, selection, hit, started));
        }

        // New upstream call: abuse and quota gate it, then the request
        // is counted before any provider spend.
        self.guard.detect_abuse(&request.account_id, &prompt).await?;
        let snapshot = self
            .guard
            .check_quota(&request.account_id, selection.estimated_tokens)
            .await?;
        self.guard.record_request(&request.account_id, &prompt).await?;

        let mut turns = request.history.clone();
        turns.push(Turn::user(prompt.clone()));

        let outcome = self
            .orchestrator
            .stream(&self.catalog, &selection.model, &turns, self.temperature)
            .await?;

        let used_credit = selection.is_premium && snapshot.tier < outcome.model.minimum_tier;
        let premium_credits_remaining = self
            .guard
            .premium_credits_remaining(&snapshot)
            .map(|r| r.saturating_sub(u32::from(used_credit)));

        let catalog = Arc::clone(&self.catalog);
        let cache = Arc::clone(&self.cache);
        let store = Arc::clone(&self.store);
        let account_id = request.account_id.clone();

        let events = async_stream::stream! {
            let served_model = outcome.model;
            let substituted = outcome.substituted_from.is_some();
            let mut substituted_from = outcome.substituted_from;
            let mut substitution_reason = outcome.substitution_reason;
            let mut provider_stream = outcome.stream;

            yield RouteEvent::Metadata {
                model: served_model.id.clone(),
                category: selection.category,
                reason: selection.reason.clone(),
                cache_consulted: true,
                is_premium: selection.is_premium,
                better_model_available: selection.better_model_available.clone(),
            };

            let mut full_text = String::new();
            let mut usage = Usage::default();
            let mut failure: Option<String> = None;

            while let Some(event) = provider_stream.next().await {
                match event {
                    Ok(ProviderEvent::Text(text)) => {
                        full_text.push_str(&text);
                        yield RouteEvent::Chunk {
                            text,
                            model: served_model.id.clone(),
                            category: selection.category,
                            // Annotates only the first chunk.
                            substituted_from: substituted_from.take(),
                            substitution_reason: substitution_reason.take(),
                        };
                    }
                    Ok(ProviderEvent::Done(final_usage)) => {
                        usage = final_usage;
                        break;
                    }
                    Err(e) => {
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }

            let latency_ms = started.elapsed().as_millis() as u64;

            if let Some(message) = failure {
                metrics::counter!(telemetry::REQUESTS_TOTAL,
                    "category" => selection.category.as_str(),
                    "status" => "error",
                )
                .increment(1);
                yield RouteEvent::Error { message };
            } else {
                finalize_success(
                    &catalog,
                    &cache,
                    store.as_ref(),
                    &account_id,
                    key,
                    &selection,
                    &served_model.id,
                    full_text,
                    usage,
                    used_credit,
                )
                .await;
                metrics::counter!(telemetry::REQUESTS_TOTAL,
                    "category" => selection.category.as_str(),
                    "status" => "ok",
                )
                .increment(1);
                metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
                    "category" => selection.category.as_str(),
                )
                .record(started.elapsed().as_secs_f64());

                yield RouteEvent::Done {
                    model: served_model.id.clone(),
                    category: selection.category,
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    latency_ms,
                    cached: false,
                    substituted,
                    premium_credits_remaining,
                };
            }
        };

        Ok(bounded_stream_events(
            Box::pin(events),
            self.stream_buffer,
        ))
    }

    /// Serve a response straight from the cache.
    ///
    /// Bypasses quota, abuse, and the upstream call; records the
    /// request as zero-cost usage (best-effort) for accounting
    /// consistency.
    fn serve_cached(
        &self,
        request: ChatRequest,
        selection: Selection,
        hit: CachedResponse,
        started: Instant,
    ) -> RouteStream {
        let store = Arc::clone(&self.store);
        let guard = Arc::clone(&self.guard);
        let account_id = request.account_id.clone();

        Box::pin(async_stream::stream! {
            yield RouteEvent::Metadata {
                model: selection.model.id.clone(),
                category: hit.category,
                reason: hit.selection_reason.clone(),
                cache_consulted: true,
                is_premium: selection.is_premium,
                better_model_available: selection.better_model_available.clone(),
            };

            yield RouteEvent::Chunk {
                text: hit.response_text.clone(),
                model: selection.model.id.clone(),
                category: hit.category,
                substituted_from: None,
                substitution_reason: None,
            };

            // Zero-cost usage record: the request happened, but no
            // tokens were spent and no credit was drawn.
            if let Err(e) = store
                .record_request(&account_id, std::time::SystemTime::now(), &request.message)
                .await
            {
                warn!(error = %e, "failed to record cache-hit usage");
            }

            let premium_credits_remaining = match guard.snapshot(&account_id).await {
                Ok(snapshot) => guard.premium_credits_remaining(&snapshot),
                Err(_) => None,
            };

            metrics::counter!(telemetry::REQUESTS_TOTAL,
                "category" => hit.category.as_str(),
                "status" => "ok",
            )
            .increment(1);

            yield RouteEvent::Done {
                model: selection.model.id.clone(),
                category: hit.category,
                input_tokens: hit.input_tokens,
                output_tokens: hit.output_tokens,
                latency_ms: started.elapsed().as_millis() as u64,
                cached: true,
                substituted: false,
                premium_credits_remaining,
            };
        })
    }

    /// Ids of models whose monthly token cap is spent.
    async fn exhausted_models(&self) -> Vec<String> {
        let mut exhausted = Vec::new();
        for model in self.catalog.models() {
            let Some(cap) = model.monthly_token_cap else {
                continue;
            };
            match self.store.model_tokens_this_period(&model.id).await {
                Ok(used) if used >= cap => exhausted.push(model.id.clone()),
                Ok(_) => {}
                Err(e) => {
                    // Treat an unreadable counter as not exhausted.
                    warn!(model = %model.id, error = %e, "failed to read model token counter");
                }
            }
        }
        exhausted
    }
}

/// Wrap the event stream in a bounded channel for backpressure.
fn bounded_stream_events(
    inner: Pin<Box<dyn Stream<Item = RouteEvent> + Send>>,
    buffer: usize,
) -> RouteStream {
    // `bounded_stream` carries `Result` items; adapt by wrapping and
    // unwrapping the infallible Ok layer.
    let wrapped: Pin<Box<dyn Stream<Item = Result<RouteEvent>> + Send>> =
        Box::pin(inner.map(Ok));
    Box::pin(bounded_stream(wrapped, buffer).filter_map(|item| async move { item.ok() }))
}

/// Persist the results of a successful upstream response.
///
/// All writes are best-effort: failures are logged for operational
/// follow-up and never fail the already-computed response.
#[allow(clippy::too_many_arguments)]
async fn finalize_success(
    catalog: &ModelCatalog,
    cache: &ResponseCache,
    store: &dyn UsageStore,
    account_id: &str,
    key: CacheKey,
    selection: &Selection,
    served_model: &str,
    full_text: String,
    usage: Usage,
    used_credit: bool,
) {
    cache.insert(
        key,
        CachedResponse {
            response_text: full_text,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            category: selection.category,
            selection_reason: selection.reason.clone(),
        },
    );

    let cost = catalog.cost_for(served_model, usage.input_tokens, usage.output_tokens);
    debug!(
        model = served_model,
        tokens = usage.total(),
        cost_usd = cost,
        "recording usage"
    );

    if let Err(e) = store.add_tokens(account_id, u64::from(usage.total())).await {
        warn!(error = %e, "failed to record token usage");
    }
    if let Err(e) = store
        .add_model_tokens(served_model, u64::from(usage.total()))
        .await
    {
        warn!(error = %e, "failed to record model token usage");
    }
    if used_credit {
        if let Err(e) = store.increment_premium_requests(account_id).await {
            warn!(error = %e, "failed to record premium credit use");
        }
    }

    metrics::counter!(telemetry::TOKENS_TOTAL,
        "model" => served_model.to_string(),
        "direction" => "input",
    )
    .increment(u64::from(usage.input_tokens));
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "model" => served_model.to_string(),
        "direction" => "output",
    )
    .increment(u64::from(usage.output_tokens));
}
