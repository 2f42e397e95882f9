//! Telemetry metric name constants.
//!
//! Centralised metric names for modelmux operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `modelmux_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `model` — catalog model id (e.g. "gpt-4o-mini")
//! - `category` — classified task category (e.g. "coding")
//! - `status` — outcome: "ok" or "error"
//! - `direction` — token direction: "input" or "output"
//! - `kind` — limit or violation kind (e.g. "minute", "degenerate_prompt")

/// Total chat requests dispatched through the router.
///
/// Labels: `category`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "modelmux_requests_total";

/// End-to-end request duration in seconds.
///
/// Labels: `category`.
pub const REQUEST_DURATION_SECONDS: &str = "modelmux_request_duration_seconds";

/// Total failover substitutions performed.
///
/// Labels: `model` (the original), `reason`.
pub const FAILOVERS_TOTAL: &str = "modelmux_failovers_total";

/// Total tokens consumed upstream.
///
/// Labels: `model`, `direction` ("input" | "output").
pub const TOKENS_TOTAL: &str = "modelmux_tokens_total";

/// Total response-cache hits.
pub const CACHE_HITS_TOTAL: &str = "modelmux_cache_hits_total";

/// Total response-cache misses.
pub const CACHE_MISSES_TOTAL: &str = "modelmux_cache_misses_total";

/// Total response-cache evictions (LRU pressure or TTL sweep).
pub const CACHE_EVICTIONS_TOTAL: &str = "modelmux_cache_evictions_total";

/// Total quota denials.
///
/// Labels: `kind` ("monthly_tokens" | "request_tokens" | "minute" | "hour" | "day").
pub const QUOTA_DENIALS_TOTAL: &str = "modelmux_quota_denials_total";

/// Total abuse violations flagged.
///
/// Labels: `kind` ("degenerate_prompt" | "repeated_prompts" | "too_fast").
pub const ABUSE_FLAGS_TOTAL: &str = "modelmux_abuse_flags_total";
