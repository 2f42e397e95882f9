//! Usage persistence behind a trait.
//!
//! Counters live in an external persistent store (the surrounding
//! system's account database). The guard and router only see
//! [`UsageStore`], so deployments swap backends without touching
//! enforcement logic, and tests run against [`MemoryStore`].
//!
//! Increments are read-then-write: enforcement here is probabilistic
//! soft-limiting, not a financial ledger, and a small overcount under
//! high concurrency is preferable to serializing every request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::Result;
use crate::types::Tier;

/// Point-in-time view of one account's counters.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub tier: Tier,
    pub tokens_used_this_period: u64,
    pub premium_requests_this_period: u32,
    pub suspicious_activity_count: u32,
    pub is_suspended: bool,
    pub suspension_reason: Option<String>,
    pub last_request_at: Option<SystemTime>,
}

/// The external account/usage store this core mutates.
///
/// Counters only increase through this interface; the billing-cycle
/// reset happens out of band in the owning system.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Load an account's counters. `None` for unknown accounts.
    async fn account(&self, account_id: &str) -> Result<Option<AccountSnapshot>>;

    /// Request timestamps within `window` of `now`, oldest first.
    async fn requests_in_window(
        &self,
        account_id: &str,
        now: SystemTime,
        window: Duration,
    ) -> Result<Vec<SystemTime>>;

    /// Record an accepted request at `at`, and the prompt that drove
    /// it (kept for near-duplicate detection).
    async fn record_request(&self, account_id: &str, at: SystemTime, prompt: &str) -> Result<()>;

    /// Add consumed tokens to the account's period counter.
    async fn add_tokens(&self, account_id: &str, tokens: u64) -> Result<()>;

    /// Add consumed tokens to a model's period counter (for models
    /// with a hard monthly cap).
    async fn add_model_tokens(&self, model_id: &str, tokens: u64) -> Result<()>;

    /// Tokens consumed through a model this period.
    async fn model_tokens_this_period(&self, model_id: &str) -> Result<u64>;

    /// Consume one premium credit.
    async fn increment_premium_requests(&self, account_id: &str) -> Result<()>;

    /// The account's most recent prompts, newest first.
    async fn recent_prompts(&self, account_id: &str, limit: usize) -> Result<Vec<String>>;

    /// Record an abuse violation; returns the account's new total.
    async fn record_violation(&self, account_id: &str, kind: &str) -> Result<u32>;

    /// Suspend the account.
    async fn suspend(&self, account_id: &str, reason: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
struct AccountState {
    tier: Tier,
    tokens_used: u64,
    premium_requests: u32,
    violations: u32,
    suspended: bool,
    suspension_reason: Option<String>,
    last_request_at: Option<SystemTime>,
    request_log: Vec<SystemTime>,
    prompts: Vec<String>,
}

/// In-memory [`UsageStore`] for tests and embedded deployments.
///
/// Accounts must be registered before use; lookups for unregistered
/// ids return `None` like a missing row would.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<String, AccountState>>,
    model_tokens: Mutex<HashMap<String, u64>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account at a tier with zeroed counters.
    pub fn register(&self, account_id: impl Into<String>, tier: Tier) {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        accounts.insert(
            account_id.into(),
            AccountState {
                tier,
                ..AccountState::default()
            },
        );
    }

    /// Set an account's period token counter (test setup).
    pub fn set_tokens_used(&self, account_id: &str, tokens: u64) {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = accounts.get_mut(account_id) {
            state.tokens_used = tokens;
        }
    }

    /// Set an account's consumed premium credits (test setup).
    pub fn set_premium_requests(&self, account_id: &str, used: u32) {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = accounts.get_mut(account_id) {
            state.premium_requests = used;
        }
    }

    fn with_account<T>(
        &self,
        account_id: &str,
        f: impl FnOnce(&mut AccountState) -> T,
    ) -> Option<T> {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        accounts.get_mut(account_id).map(f)
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn account(&self, account_id: &str) -> Result<Option<AccountSnapshot>> {
        let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(accounts.get(account_id).map(|state| AccountSnapshot {
            tier: state.tier,
            tokens_used_this_period: state.tokens_used,
            premium_requests_this_period: state.premium_requests,
            suspicious_activity_count: state.violations,
            is_suspended: state.suspended,
            suspension_reason: state.suspension_reason.clone(),
            last_request_at: state.last_request_at,
        }))
    }

    async fn requests_in_window(
        &self,
        account_id: &str,
        now: SystemTime,
        window: Duration,
    ) -> Result<Vec<SystemTime>> {
        let cutoff = now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(self
            .with_account(account_id, |state| {
                let mut hits: Vec<SystemTime> = state
                    .request_log
                    .iter()
                    .copied()
                    .filter(|at| *at >= cutoff && *at <= now)
                    .collect();
                hits.sort();
                hits
            })
            .unwrap_or_default())
    }

    async fn record_request(&self, account_id: &str, at: SystemTime, prompt: &str) -> Result<()> {
        self.with_account(account_id, |state| {
            state.request_log.push(at);
            state.last_request_at = Some(at);
            state.prompts.push(prompt.to_string());
        });
        Ok(())
    }

    async fn add_tokens(&self, account_id: &str, tokens: u64) -> Result<()> {
        self.with_account(account_id, |state| {
            state.tokens_used += tokens;
        });
        Ok(())
    }

    async fn add_model_tokens(&self, model_id: &str, tokens: u64) -> Result<()> {
        let mut model_tokens = self.model_tokens.lock().unwrap_or_else(|e| e.into_inner());
        *model_tokens.entry(model_id.to_string()).or_default() += tokens;
        Ok(())
    }

    async fn model_tokens_this_period(&self, model_id: &str) -> Result<u64> {
        let model_tokens = self.model_tokens.lock().unwrap_or_else(|e| e.into_inner());
        Ok(model_tokens.get(model_id).copied().unwrap_or(0))
    }

    async fn increment_premium_requests(&self, account_id: &str) -> Result<()> {
        self.with_account(account_id, |state| {
            state.premium_requests += 1;
        });
        Ok(())
    }

    async fn recent_prompts(&self, account_id: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .with_account(account_id, |state| {
                state.prompts.iter().rev().take(limit).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn record_violation(&self, account_id: &str, _kind: &str) -> Result<u32> {
        Ok(self
            .with_account(account_id, |state| {
                state.violations += 1;
                state.violations
            })
            .unwrap_or(0))
    }

    async fn suspend(&self, account_id: &str, reason: &str) -> Result<()> {
        self.with_account(account_id, |state| {
            state.suspended = true;
            state.suspension_reason = Some(reason.to_string());
        });
        Ok(())
    }
}
