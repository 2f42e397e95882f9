use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use modelmux::providers::ProviderStream;
use modelmux::{
    ChatRequest, ChatRouter, CompletionProvider, FailoverConfig, LimitKind, MemoryStore,
    ModelCatalog, ModelmuxError, ProviderEvent, ProviderKind, Result, RouteEvent, Tier, Turn,
    Usage, UsageStore,
};

/// Extract the error from a route result without requiring the success
/// type (a boxed stream) to implement `Debug`, as `unwrap_err` would.
fn expect_err<T>(result: Result<T>) -> ModelmuxError {
    match result {
        Ok(_) => panic!("expected Err, got Ok"),
        Err(e) => e,
    }
}

/// Minimal single-vendor catalog: one free model, one premium model,
/// one backup in the free model's chain.
fn test_catalog() -> ModelCatalog {
    let doc = r#"{
        "version": 1,
        "default_model": "cheap",
        "models": [
            {
                "id": "cheap", "provider": "openai", "display_name": "Cheap Model",
                "cost_per_million_input_tokens": 0.1,
                "cost_per_million_output_tokens": 0.2,
                "max_context_tokens": 8000, "supports_streaming": true,
                "rank_by_category": {
                    "coding": 2, "creative": 1, "math": 1, "casual": 1, "data_analysis": 1
                },
                "minimum_tier": "free"
            },
            {
                "id": "premium", "provider": "openai", "display_name": "Premium Model",
                "cost_per_million_input_tokens": 1.0,
                "cost_per_million_output_tokens": 4.0,
                "max_context_tokens": 16000, "supports_streaming": true,
                "rank_by_category": {"coding": 1},
                "minimum_tier": "pro",
                "preferred_categories": ["coding"]
            },
            {
                "id": "backup", "provider": "openai", "display_name": "Backup Model",
                "cost_per_million_input_tokens": 0.2,
                "cost_per_million_output_tokens": 0.4,
                "max_context_tokens": 8000, "supports_streaming": true,
                "rank_by_category": {
                    "coding": 3, "creative": 2, "math": 2, "casual": 2, "data_analysis": 2
                },
                "minimum_tier": "free"
            }
        ],
        "failover_chains": {
            "cheap": ["backup"]
        }
    }"#;
    ModelCatalog::from_json_str(doc).unwrap()
}

/// Mock vendor: scripted per-model transient failures, then a fixed
/// two-fragment response.
struct MockVendor {
    failures: Mutex<HashMap<String, u32>>,
    mid_stream_error: bool,
}

impl MockVendor {
    fn healthy() -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            mid_stream_error: false,
        }
    }

    fn failing(failures: &[(&str, u32)]) -> Self {
        Self {
            failures: Mutex::new(
                failures
                    .iter()
                    .map(|(id, n)| (id.to_string(), *n))
                    .collect(),
            ),
            mid_stream_error: false,
        }
    }

    fn broken_stream() -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            mid_stream_error: true,
        }
    }
}

#[async_trait]
impl CompletionProvider for MockVendor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream(
        &self,
        model: &str,
        _turns: &[Turn],
        _temperature: f32,
    ) -> Result<ProviderStream> {
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(model) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ModelmuxError::RateLimited { retry_after: None });
                }
            }
        }
        let events: Vec<Result<ProviderEvent>> = if self.mid_stream_error {
            vec![
                Ok(ProviderEvent::Text("partial".into())),
                Err(ModelmuxError::Stream("connection reset".into())),
            ]
        } else {
            vec![
                Ok(ProviderEvent::Text("Hello".into())),
                Ok(ProviderEvent::Text(", world".into())),
                Ok(ProviderEvent::Done(Usage {
                    input_tokens: 12,
                    output_tokens: 8,
                })),
            ]
        };
        Ok(Box::pin(stream::iter(events)))
    }
}

fn router_with(vendor: MockVendor, store: Arc<MemoryStore>) -> ChatRouter {
    ChatRouter::builder()
        .catalog(test_catalog())
        .store(store)
        .provider(ProviderKind::OpenAi, Arc::new(vendor))
        .failover_config(
            FailoverConfig::new()
                .initial_backoff(Duration::from_millis(1))
                .max_backoff(Duration::from_millis(2)),
        )
        .build()
        .unwrap()
}

async fn collect(router: &ChatRouter, request: ChatRequest) -> Vec<RouteEvent> {
    let mut stream = router.chat(request).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn happy_path_event_sequence() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Free);
    let router = router_with(MockVendor::healthy(), Arc::clone(&store));

    let events = collect(
        &router,
        ChatRequest::new("acct", "conv", "what is the capital of france"),
    )
    .await;

    match &events[0] {
        RouteEvent::Metadata {
            model,
            cache_consulted,
            is_premium,
            ..
        } => {
            assert_eq!(model, "cheap");
            assert!(cache_consulted);
            assert!(!is_premium);
        }
        other => panic!("expected metadata first, got {other:?}"),
    }

    let chunks: Vec<&RouteEvent> = events
        .iter()
        .filter(|e| matches!(e, RouteEvent::Chunk { .. }))
        .collect();
    assert_eq!(chunks.len(), 2);
    for chunk in &chunks {
        match chunk {
            RouteEvent::Chunk {
                model, category, ..
            } => {
                assert_eq!(model, "cheap");
                assert_eq!(*category, modelmux::TaskCategory::Casual);
            }
            _ => unreachable!(),
        }
    }

    match events.last().unwrap() {
        RouteEvent::Done {
            input_tokens,
            output_tokens,
            cached,
            substituted,
            ..
        } => {
            assert_eq!(*input_tokens, 12);
            assert_eq!(*output_tokens, 8);
            assert!(!cached);
            assert!(!substituted);
        }
        other => panic!("expected done last, got {other:?}"),
    }

    // Usage landed in the store.
    let snapshot = store.account("acct").await.unwrap().unwrap();
    assert_eq!(snapshot.tokens_used_this_period, 20);
}

#[tokio::test]
async fn empty_prompt_rejected_before_any_event() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Free);
    let router = router_with(MockVendor::healthy(), store);

    let err = expect_err(
            router.chat(ChatRequest::new("acct", "conv", "   ")).await,
        );
    assert!(matches!(err, ModelmuxError::InvalidInput(_)));
}

#[tokio::test]
async fn unknown_account_rejected() {
    let store = Arc::new(MemoryStore::new());
    let router = router_with(MockVendor::healthy(), store);

    let err = expect_err(
            router.chat(ChatRequest::new("ghost", "conv", "hello there")).await,
        );
    assert!(matches!(err, ModelmuxError::UnknownAccount(_)));
}

#[tokio::test]
async fn exhausted_trial_rejected() {
    let store = Arc::new(MemoryStore::new());
    store.register("anon", Tier::Free);
    let router = router_with(MockVendor::healthy(), store);

    let err = expect_err(
            router.chat(ChatRequest::new("anon", "conv", "hello there").with_trial_remaining(0)).await,
        );
    match err {
        ModelmuxError::QuotaExceeded { limit_kind, .. } => {
            assert_eq!(limit_kind, LimitKind::Trial);
        }
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_denial_is_out_of_band() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Free); // 5/minute

    let now = SystemTime::now();
    for i in 0..5 {
        store
            .record_request("acct", now - Duration::from_secs(10 + i), &format!("p{i}"))
            .await
            .unwrap();
    }

    let router = router_with(MockVendor::healthy(), store);
    let err = expect_err(
            router.chat(ChatRequest::new("acct", "conv", "one more request please")).await,
        );

    match err {
        ModelmuxError::QuotaExceeded {
            limit_kind,
            retry_after,
            ..
        } => {
            assert_eq!(limit_kind, LimitKind::Minute);
            assert!(retry_after.is_some());
        }
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn degenerate_prompt_rejected_as_abuse() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Free);
    let router = router_with(MockVendor::healthy(), Arc::clone(&store));

    let err = expect_err(
            router.chat(ChatRequest::new("acct", "conv", "hi")).await,
        );
    assert!(matches!(err, ModelmuxError::AbuseDetected(_)));

    let snapshot = store.account("acct").await.unwrap().unwrap();
    assert_eq!(snapshot.suspicious_activity_count, 1);
}

#[tokio::test]
async fn repeat_prompt_served_from_cache_with_zero_cost() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Unlimited);
    let router = router_with(MockVendor::healthy(), Arc::clone(&store));

    let request = ChatRequest::new("acct", "conv", "what is the capital of france");
    let first = collect(&router, request.clone()).await;
    match first.last().unwrap() {
        RouteEvent::Done { cached, .. } => assert!(!cached),
        other => panic!("expected done, got {other:?}"),
    }
    let tokens_after_first = store
        .account("acct")
        .await
        .unwrap()
        .unwrap()
        .tokens_used_this_period;

    // Identical prompt and history, immediately afterwards: a cache
    // hit bypasses quota/abuse (the 2s inter-arrival floor included)
    // and records zero additional cost.
    let second = collect(&router, request).await;
    match second.last().unwrap() {
        RouteEvent::Done { cached, .. } => assert!(cached),
        other => panic!("expected done, got {other:?}"),
    }

    let full_text: String = second
        .iter()
        .filter_map(|e| match e {
            RouteEvent::Chunk { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(full_text, "Hello, world");

    let tokens_after_second = store
        .account("acct")
        .await
        .unwrap()
        .unwrap()
        .tokens_used_this_period;
    assert_eq!(tokens_after_first, tokens_after_second);

    let stats = router.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn whitespace_and_case_variants_share_a_cache_entry() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Unlimited);
    let router = router_with(MockVendor::healthy(), store);

    let first = collect(
        &router,
        ChatRequest::new("acct", "conv", "Explain lifetimes in rust please"),
    )
    .await;
    assert!(matches!(first.last(), Some(RouteEvent::Done { .. })));

    let second = collect(
        &router,
        ChatRequest::new("acct", "conv", "  explain lifetimes in RUST please  "),
    )
    .await;
    match second.last().unwrap() {
        RouteEvent::Done { cached, .. } => assert!(cached),
        other => panic!("expected cached done, got {other:?}"),
    }
}

#[tokio::test]
async fn failover_annotates_first_chunk_only() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Free);
    let router = router_with(MockVendor::failing(&[("cheap", 1)]), store);

    let events = collect(
        &router,
        ChatRequest::new("acct", "conv", "what is the capital of france"),
    )
    .await;

    let chunks: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RouteEvent::Chunk {
                substituted_from,
                substitution_reason,
                model,
                ..
            } => Some((substituted_from.clone(), substitution_reason.clone(), model.clone())),
            _ => None,
        })
        .collect();

    assert!(chunks.len() >= 2);
    assert_eq!(chunks[0].0.as_deref(), Some("cheap"));
    assert!(chunks[0].1.as_deref().unwrap().contains("rate limited"));
    assert_eq!(chunks[0].2, "backup");
    assert!(chunks[1].0.is_none());
    assert!(chunks[1].1.is_none());

    match events.last().unwrap() {
        RouteEvent::Done {
            model, substituted, ..
        } => {
            assert_eq!(model, "backup");
            assert!(substituted);
        }
        other => panic!("expected done, got {other:?}"),
    }
}

#[tokio::test]
async fn mid_stream_failure_emits_terminal_error_event() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Free);
    let router = router_with(MockVendor::broken_stream(), Arc::clone(&store));

    let events = collect(
        &router,
        ChatRequest::new("acct", "conv", "what is the capital of france"),
    )
    .await;

    assert!(matches!(events.first(), Some(RouteEvent::Metadata { .. })));
    match events.last().unwrap() {
        RouteEvent::Error { message } => assert!(message.contains("connection reset")),
        other => panic!("expected error event, got {other:?}"),
    }

    // The failed response must not be cached.
    assert_eq!(router.cache_stats().size, 0);
}

#[tokio::test]
async fn premium_credit_consumed_and_reported() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Free);
    let router = router_with(MockVendor::healthy(), Arc::clone(&store));

    // A coding prompt routes to the premium model via premium credit.
    let events = collect(
        &router,
        ChatRequest::new("acct", "conv", "write a function to reverse a linked list"),
    )
    .await;

    match &events[0] {
        RouteEvent::Metadata {
            model, is_premium, ..
        } => {
            assert_eq!(model, "premium");
            assert!(is_premium);
        }
        other => panic!("expected metadata, got {other:?}"),
    }

    match events.last().unwrap() {
        RouteEvent::Done {
            premium_credits_remaining,
            ..
        } => assert_eq!(*premium_credits_remaining, Some(9)),
        other => panic!("expected done, got {other:?}"),
    }

    let snapshot = store.account("acct").await.unwrap().unwrap();
    assert_eq!(snapshot.premium_requests_this_period, 1);
}

#[tokio::test]
async fn spent_premium_credits_route_to_free_model() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Free);
    store.set_premium_requests("acct", 10); // allotment spent
    let router = router_with(MockVendor::healthy(), store);

    let events = collect(
        &router,
        ChatRequest::new("acct", "conv", "write a function to reverse a linked list"),
    )
    .await;

    match &events[0] {
        RouteEvent::Metadata {
            model,
            better_model_available,
            ..
        } => {
            assert_eq!(model, "cheap");
            // The upsell surface names the premium pick one tier up.
            assert_eq!(better_model_available.as_deref(), Some("Premium Model"));
        }
        other => panic!("expected metadata, got {other:?}"),
    }
}

#[tokio::test]
async fn dropping_the_stream_stops_consumption() {
    let store = Arc::new(MemoryStore::new());
    store.register("acct", Tier::Free);
    let router = router_with(MockVendor::healthy(), store);

    let mut stream = router
        .chat(ChatRequest::new("acct", "conv", "what is the capital of france"))
        .await
        .unwrap();

    // Read only the metadata event, then disconnect.
    let first = stream.next().await.unwrap();
    assert!(matches!(first, RouteEvent::Metadata { .. }));
    drop(stream);
    // The producer task notices the dropped receiver on its next send
    // and aborts the generator; nothing to assert beyond not hanging.
}
