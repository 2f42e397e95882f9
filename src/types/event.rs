//! Streaming event types
//!
//! Two layers of events flow through a request:
//!
//! - [`ProviderEvent`] — what a provider adapter emits: text fragments
//!   terminated by a usage summary. Vendor wire formats are parsed into
//!   this shape inside the adapters, so nothing above them sees a
//!   provider payload.
//! - [`RouteEvent`] — what the router emits to the caller: one metadata
//!   event, zero or more chunks (each re-stating model and category so
//!   late subscribers render consistently), and exactly one terminal
//!   `done` or `error`.

use serde::{Deserialize, Serialize};

use super::TaskCategory;

/// Token usage statistics reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    /// Total tokens across both directions.
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Events emitted by a provider adapter during one completion.
///
/// A well-behaved stream is zero or more `Text` items followed by
/// exactly one `Done`. Non-streaming models produce one `Text` and
/// one `Done`.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// Incremental text fragment.
    Text(String),
    /// Completion finished; final token accounting.
    Done(Usage),
}

/// Events emitted to the caller for one routed chat request.
///
/// Serializes with a `type` tag so transports can forward events as
/// JSON lines or SSE data payloads unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteEvent {
    /// First event: what was decided before any upstream call.
    Metadata {
        model: String,
        category: TaskCategory,
        /// Human-readable selection reason.
        reason: String,
        /// Whether the response cache will be consulted.
        cache_consulted: bool,
        is_premium: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        better_model_available: Option<String>,
    },

    /// Incremental text. Model and category are re-stated on every
    /// chunk. Substitution fields are set on the first chunk of a
    /// failed-over response and absent otherwise.
    Chunk {
        text: String,
        model: String,
        category: TaskCategory,
        #[serde(skip_serializing_if = "Option::is_none")]
        substituted_from: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        substitution_reason: Option<String>,
    },

    /// Terminal success event.
    Done {
        model: String,
        category: TaskCategory,
        input_tokens: u32,
        output_tokens: u32,
        latency_ms: u64,
        /// Whether the response came from the cache.
        cached: bool,
        /// Whether a provider substitution occurred.
        substituted: bool,
        /// Remaining premium-credit balance, for tiers that have one.
        #[serde(skip_serializing_if = "Option::is_none")]
        premium_credits_remaining: Option<u32>,
    },

    /// Terminal failure event (stream died after events were emitted).
    Error { message: String },
}

impl RouteEvent {
    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteEvent::Done { .. } | RouteEvent::Error { .. })
    }
}
