//! Failover orchestration across equivalent models.
//!
//! Wraps a streaming call to a chosen model. On a retryable provider
//! failure (rate limited, unavailable, timeout, bad credentials) the
//! orchestrator consults the failover chain of the *original* model —
//! never the most recent attempt — picks the first substitute not yet
//! tried, waits out an exponential backoff, and tries again. Attempts
//! are strictly sequential: at most one upstream call is in flight per
//! request.
//!
//! Retry covers the attempt itself (connection + non-streaming calls),
//! not mid-stream failures — once chunks have been emitted, replaying
//! through a substitute would duplicate output.
//!
//! Non-streaming models are adapted to the streaming interface: their
//! single complete response is emitted as one chunk followed by the
//! usage summary.

use std::time::Duration;

use futures_util::stream;
use tracing::warn;

use super::traits::ProviderStream;
use super::ProviderSet;
use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::telemetry;
use crate::types::{ProviderEvent, Turn};
use crate::{ModelmuxError, Result};

/// Configuration for failover behaviour.
///
/// ```rust
/// # use modelmux::FailoverConfig;
/// # use std::time::Duration;
/// let config = FailoverConfig::new()
///     .max_attempts(4)
///     .initial_backoff(Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct FailoverConfig {
    /// Maximum attempts including the original request. Default: 4
    /// (original + up to 3 substitutes).
    pub max_attempts: u32,
    /// Backoff before the first retry. Default: 1s.
    pub initial_backoff: Duration,
    /// Cap on the doubling backoff. Default: 5s.
    pub max_backoff: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl FailoverConfig {
    /// Create a config with the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum attempts (including the original request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the backoff before the first retry.
    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set the backoff cap.
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Backoff before retry number `retry` (0-indexed): doubling from
    /// the initial delay, capped.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let delay = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(retry));
        delay.min(self.max_backoff)
    }
}

/// A successfully established attempt, annotated with whether a
/// substitution occurred.
pub struct StreamOutcome {
    /// The model that is actually answering.
    pub model: ModelDescriptor,
    /// Original model id, when a substitute is answering.
    pub substituted_from: Option<String>,
    /// Human-readable reason for the substitution.
    pub substitution_reason: Option<String>,
    /// The completion event stream.
    pub stream: ProviderStream,
}

impl std::fmt::Debug for StreamOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOutcome")
            .field("model", &self.model)
            .field("substituted_from", &self.substituted_from)
            .field("substitution_reason", &self.substitution_reason)
            .finish_non_exhaustive()
    }
}

/// Drives sequential attempts across a model's failover chain.
pub struct FailoverOrchestrator {
    providers: ProviderSet,
    config: FailoverConfig,
}

impl FailoverOrchestrator {
    /// Create an orchestrator over a provider set with default policy.
    pub fn new(providers: ProviderSet) -> Self {
        Self::with_config(providers, FailoverConfig::default())
    }

    /// Create an orchestrator with a custom policy.
    pub fn with_config(providers: ProviderSet, config: FailoverConfig) -> Self {
        Self { providers, config }
    }

    /// Open a completion stream for `model`, failing over along its
    /// chain on retryable errors.
    ///
    /// Fatal errors propagate immediately. A retryable failure with no
    /// substitutes left (or the attempt budget spent) surfaces as
    /// [`ModelmuxError::FailoverExhausted`].
    pub async fn stream(
        &self,
        catalog: &ModelCatalog,
        model: &ModelDescriptor,
        turns: &[Turn],
        temperature: f32,
    ) -> Result<StreamOutcome> {
        let original = model.clone();
        let mut current = model.clone();
        let mut attempted: Vec<String> = Vec::new();
        let mut first_failure: Option<String> = None;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            attempted.push(current.id.clone());

            match self.attempt(&current, turns, temperature).await {
                Ok(stream) => {
                    let substituted = current.id != original.id;
                    return Ok(StreamOutcome {
                        substituted_from: substituted.then(|| original.id.clone()),
                        substitution_reason: if substituted { first_failure } else { None },
                        model: current,
                        stream,
                    });
                }
                Err(e) if e.is_transient() => {
                    metrics::counter!(telemetry::FAILOVERS_TOTAL,
                        "model" => original.id.clone(),
                        "reason" => transient_reason(&e),
                    )
                    .increment(1);
                    warn!(
                        model = %current.id,
                        original = %original.id,
                        attempt,
                        error = %e,
                        "provider attempt failed, consulting failover chain"
                    );
                    if first_failure.is_none() {
                        first_failure = Some(format!(
                            "{} was {}",
                            original.display_name,
                            transient_reason(&e)
                        ));
                    }

                    if attempt >= self.config.max_attempts {
                        return Err(ModelmuxError::FailoverExhausted {
                            model: original.id,
                            attempts: attempt,
                        });
                    }
                    let Some(next) = catalog.next_substitute(&original.id, &attempted) else {
                        return Err(ModelmuxError::FailoverExhausted {
                            model: original.id,
                            attempts: attempt,
                        });
                    };

                    // Retries are strictly sequential: wait out the
                    // backoff before the next attempt goes upstream.
                    tokio::time::sleep(self.config.backoff_for(attempt - 1)).await;
                    current = next.clone();
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One upstream attempt. Non-streaming models are served through
    /// `complete` and adapted to the stream shape.
    async fn attempt(
        &self,
        model: &ModelDescriptor,
        turns: &[Turn],
        temperature: f32,
    ) -> Result<ProviderStream> {
        let provider = self.providers.get(model.provider).ok_or_else(|| {
            ModelmuxError::Configuration(format!(
                "no provider registered for vendor '{}'",
                model.provider
            ))
        })?;

        if model.supports_streaming {
            provider.stream(&model.id, turns, temperature).await
        } else {
            let completion = provider.complete(&model.id, turns, temperature).await?;
            Ok(Box::pin(stream::iter([
                Ok(ProviderEvent::Text(completion.text)),
                Ok(ProviderEvent::Done(completion.usage)),
            ])))
        }
    }
}

/// Short human-readable description of a retryable failure.
fn transient_reason(e: &ModelmuxError) -> &'static str {
    match e {
        ModelmuxError::RateLimited { .. } => "rate limited",
        ModelmuxError::Unavailable(_) => "unavailable",
        ModelmuxError::Timeout => "timing out",
        ModelmuxError::AuthenticationFailed => "rejecting credentials",
        _ => "failing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = FailoverConfig::default();
        assert_eq!(config.backoff_for(0), Duration::from_secs(1));
        assert_eq!(config.backoff_for(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for(2), Duration::from_secs(4));
        assert_eq!(config.backoff_for(3), Duration::from_secs(5)); // capped
        assert_eq!(config.backoff_for(10), Duration::from_secs(5));
    }

    #[test]
    fn builder_overrides() {
        let config = FailoverConfig::new()
            .max_attempts(2)
            .initial_backoff(Duration::from_millis(10))
            .max_backoff(Duration::from_millis(15));
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.backoff_for(0), Duration::from_millis(10));
        assert_eq!(config.backoff_for(1), Duration::from_millis(15));
    }
}
