//! Quota enforcement and abuse detection.
//!
//! [`QuotaGuard`] gates every new upstream call:
//!
//! - **Quota** — suspension, monthly token budget, per-request token
//!   ceiling, then counted minute/hour/day windows, in that order. The
//!   first failing check short-circuits with the specific limit kind
//!   and, for time windows, a retry-after derived from when the oldest
//!   counted request ages out.
//! - **Abuse** — degenerate prompts, near-duplicate floods, and
//!   sub-2-second inter-arrival. Each flag is recorded through the
//!   store; an account crossing the violation threshold is
//!   auto-suspended.
//!
//! Counters live behind [`UsageStore`]; enforcement is soft-limiting
//! with read-then-write increments, so a small overcount under racing
//! requests is tolerated rather than paid for with heavy locking.

pub mod store;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{instrument, warn};

use crate::classify::{degenerate_prompt_reason, prompt_similarity};
use crate::telemetry;
use crate::types::{LimitKind, Tier};
use crate::{ModelmuxError, Result};

pub use store::{AccountSnapshot, MemoryStore, UsageStore};

/// Per-tier quota ceilings.
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    /// Period token budget; `None` for the unbounded tier.
    pub monthly_token_limit: Option<u64>,
    pub max_tokens_per_request: u32,
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub requests_per_day: u32,
    /// Premium-credit allotment; `None` means unlimited.
    pub premium_requests_per_period: Option<u32>,
}

/// Quota ceilings for a tier.
pub fn limits_for(tier: Tier) -> TierLimits {
    match tier {
        Tier::Free => TierLimits {
            monthly_token_limit: Some(100_000),
            max_tokens_per_request: 2_000,
            requests_per_minute: 5,
            requests_per_hour: 50,
            requests_per_day: 200,
            premium_requests_per_period: Some(10),
        },
        Tier::Pro => TierLimits {
            monthly_token_limit: Some(2_000_000),
            max_tokens_per_request: 8_000,
            requests_per_minute: 20,
            requests_per_hour: 300,
            requests_per_day: 2_000,
            premium_requests_per_period: Some(200),
        },
        Tier::Unlimited => TierLimits {
            monthly_token_limit: None,
            max_tokens_per_request: 32_000,
            requests_per_minute: 60,
            requests_per_hour: 2_000,
            requests_per_day: 10_000,
            premium_requests_per_period: None,
        },
    }
}

/// Tunable guard thresholds.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Requests closer together than this are flagged as bot traffic.
    pub min_request_interval: Duration,
    /// Jaccard similarity at which two prompts count as duplicates.
    pub near_duplicate_similarity: f64,
    /// Duplicates among the recent prompts needed to flag a flood.
    pub near_duplicate_count: usize,
    /// How many recent prompts to compare against.
    pub recent_prompt_window: usize,
    /// Recorded violations that trigger auto-suspension.
    pub suspension_threshold: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_request_interval: Duration::from_secs(2),
            near_duplicate_similarity: 0.95,
            near_duplicate_count: 3,
            recent_prompt_window: 5,
            suspension_threshold: 10,
        }
    }
}

/// Tracks per-account consumption against tier limits and flags
/// anomalous request patterns.
pub struct QuotaGuard {
    store: Arc<dyn UsageStore>,
    config: GuardConfig,
}

impl QuotaGuard {
    /// Create a guard over a usage store with default thresholds.
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self::with_config(store, GuardConfig::default())
    }

    /// Create a guard with custom thresholds.
    pub fn with_config(store: Arc<dyn UsageStore>, config: GuardConfig) -> Self {
        Self { store, config }
    }

    /// Load the account snapshot, failing on unknown ids.
    pub async fn snapshot(&self, account_id: &str) -> Result<AccountSnapshot> {
        self.store
            .account(account_id)
            .await?
            .ok_or_else(|| ModelmuxError::UnknownAccount(account_id.to_string()))
    }

    /// Whether the account can draw on a premium credit right now.
    ///
    /// Tiers with an unbounded allotment always can; otherwise the
    /// period counter must be under the allotment.
    pub fn has_premium_credit(&self, snapshot: &AccountSnapshot) -> bool {
        match limits_for(snapshot.tier).premium_requests_per_period {
            None => true,
            Some(allotment) => snapshot.premium_requests_this_period < allotment,
        }
    }

    /// Remaining premium credits, when the tier has a finite allotment.
    pub fn premium_credits_remaining(&self, snapshot: &AccountSnapshot) -> Option<u32> {
        limits_for(snapshot.tier)
            .premium_requests_per_period
            .map(|allotment| allotment.saturating_sub(snapshot.premium_requests_this_period))
    }

    /// Check the account against its tier's quota ceilings.
    ///
    /// Returns the account snapshot on success so callers can reuse
    /// the tier and counters without a second store round-trip.
    #[instrument(skip(self), fields(account = account_id))]
    pub async fn check_quota(
        &self,
        account_id: &str,
        estimated_tokens: u32,
    ) -> Result<AccountSnapshot> {
        let snapshot = self.snapshot(account_id).await?;

        if snapshot.is_suspended {
            let reason = snapshot
                .suspension_reason
                .clone()
                .unwrap_or_else(|| "account suspended".to_string());
            return Err(ModelmuxError::AccountSuspended(reason));
        }

        let limits = limits_for(snapshot.tier);

        if let Some(budget) = limits.monthly_token_limit {
            let remaining = budget.saturating_sub(snapshot.tokens_used_this_period);
            if remaining < u64::from(estimated_tokens) {
                return Err(self.deny(
                    LimitKind::MonthlyTokens,
                    "monthly token limit exceeded".to_string(),
                    None,
                ));
            }
        }

        if estimated_tokens > limits.max_tokens_per_request {
            return Err(self.deny(
                LimitKind::RequestTokens,
                format!(
                    "request exceeds maximum tokens ({})",
                    limits.max_tokens_per_request
                ),
                None,
            ));
        }

        let now = SystemTime::now();
        let windows = [
            (LimitKind::Minute, 60u64, limits.requests_per_minute),
            (LimitKind::Hour, 3_600, limits.requests_per_hour),
            (LimitKind::Day, 86_400, limits.requests_per_day),
        ];
        for (kind, window_secs, ceiling) in windows {
            let window = Duration::from_secs(window_secs);
            let requests = self
                .store
                .requests_in_window(account_id, now, window)
                .await?;
            if requests.len() >= ceiling as usize {
                let retry_after = retry_after(&requests, now, window);
                return Err(self.deny(
                    kind,
                    format!("rate limit exceeded: {ceiling} requests per {kind}"),
                    Some(retry_after),
                ));
            }
        }

        Ok(snapshot)
    }

    fn deny(
        &self,
        limit_kind: LimitKind,
        reason: String,
        retry_after: Option<Duration>,
    ) -> ModelmuxError {
        metrics::counter!(telemetry::QUOTA_DENIALS_TOTAL, "kind" => limit_kind.as_str())
            .increment(1);
        ModelmuxError::QuotaExceeded {
            reason,
            limit_kind,
            retry_after,
        }
    }

    /// Flag anomalous request patterns for this prompt.
    ///
    /// Runs only on a cache miss — a hit never re-verifies input that
    /// already produced an accepted response. Any flagged violation is
    /// recorded; crossing the violation threshold suspends the account.
    #[instrument(skip(self, prompt), fields(account = account_id))]
    pub async fn detect_abuse(&self, account_id: &str, prompt: &str) -> Result<()> {
        if let Some(reason) = degenerate_prompt_reason(prompt) {
            return self
                .flag(account_id, "degenerate_prompt", reason.to_string())
                .await;
        }

        let recent = self
            .store
            .recent_prompts(account_id, self.config.recent_prompt_window)
            .await?;
        let duplicates = recent
            .iter()
            .filter(|past| prompt_similarity(prompt, past) >= self.config.near_duplicate_similarity)
            .count();
        if duplicates >= self.config.near_duplicate_count {
            return self
                .flag(
                    account_id,
                    "repeated_prompts",
                    "repeated near-identical prompts".to_string(),
                )
                .await;
        }

        let snapshot = self.snapshot(account_id).await?;
        if let Some(last) = snapshot.last_request_at {
            let elapsed = SystemTime::now()
                .duration_since(last)
                .unwrap_or(Duration::ZERO);
            if elapsed < self.config.min_request_interval {
                return self
                    .flag(
                        account_id,
                        "too_fast",
                        "requests too frequent".to_string(),
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// Record a violation and either suspend or reject.
    async fn flag(&self, account_id: &str, kind: &'static str, reason: String) -> Result<()> {
        metrics::counter!(telemetry::ABUSE_FLAGS_TOTAL, "kind" => kind).increment(1);
        let total = self.store.record_violation(account_id, kind).await?;
        warn!(account = account_id, kind, total, "abuse violation flagged");

        if total >= self.config.suspension_threshold {
            let suspension = "multiple abuse violations detected";
            self.store.suspend(account_id, suspension).await?;
            return Err(ModelmuxError::AccountSuspended(suspension.to_string()));
        }
        Err(ModelmuxError::AbuseDetected(reason))
    }

    /// Record an accepted request and its prompt.
    pub async fn record_request(&self, account_id: &str, prompt: &str) -> Result<()> {
        self.store
            .record_request(account_id, SystemTime::now(), prompt)
            .await
    }
}

/// Seconds until the oldest counted request leaves the window.
fn retry_after(requests: &[SystemTime], now: SystemTime, window: Duration) -> Duration {
    let Some(oldest) = requests.first() else {
        return window;
    };
    let age = now.duration_since(*oldest).unwrap_or(Duration::ZERO);
    let remaining = window.saturating_sub(age);
    // Round up to whole seconds so callers never retry a moment early.
    Duration::from_secs(remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0))
}
