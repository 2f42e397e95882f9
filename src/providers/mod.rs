//! Provider adapters and failover orchestration.
//!
//! Three upstream wire formats live behind one capability trait:
//!
//! - [`OpenAiProvider`] — `data:`-line SSE with a `[DONE]` sentinel
//! - [`AnthropicProvider`] — named-event SSE
//! - [`GoogleProvider`] — `alt=sse` JSON chunks
//!
//! [`ProviderSet`] maps each catalog [`ProviderKind`] to its adapter.
//! [`failover::FailoverOrchestrator`] drives attempts across the
//! catalog's substitution chains.

pub mod anthropic;
pub mod backpressure;
pub mod failover;
pub mod google;
pub mod openai;
pub mod traits;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicProvider;
pub use backpressure::{DEFAULT_STREAM_BUFFER, bounded_stream};
pub use failover::{FailoverConfig, FailoverOrchestrator};
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use traits::{Completion, CompletionProvider, ProviderStream};

use crate::ModelmuxError;
use crate::catalog::ProviderKind;

/// Registered providers, keyed by vendor.
#[derive(Default, Clone)]
pub struct ProviderSet {
    providers: HashMap<ProviderKind, Arc<dyn CompletionProvider>>,
}

impl ProviderSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for a vendor.
    pub fn with(mut self, kind: ProviderKind, provider: Arc<dyn CompletionProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    /// Look up the adapter for a vendor.
    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn CompletionProvider>> {
        self.providers.get(&kind)
    }

    /// Whether any provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Map an unsuccessful HTTP response to an error category.
///
/// Keeps status interpretation in one place so every adapter reports
/// the same retryability signals: 429 → rate limited (honouring a
/// `retry-after` header), 401/403 → authentication, 408 → timeout,
/// 5xx → unavailable, anything else a terminal API error.
pub(crate) async fn error_for_response(response: reqwest::Response) -> ModelmuxError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        429 => ModelmuxError::RateLimited { retry_after },
        401 | 403 => ModelmuxError::AuthenticationFailed,
        408 => ModelmuxError::Timeout,
        500..=599 => ModelmuxError::Unavailable(format!("{status}: {body}")),
        code => ModelmuxError::Api {
            status: code,
            message: body,
        },
    }
}
