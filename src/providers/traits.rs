//! Provider capability trait.
//!
//! Each upstream vendor implements [`CompletionProvider`] and parses
//! its own wire format into [`ProviderEvent`]s, so the failover
//! orchestrator and the router depend only on this trait — no vendor
//! payload shape leaks above the adapter layer.
//!
//! Adapters surface distinguishable error categories (rate-limited,
//! unavailable, timeout, authentication) via
//! [`ModelmuxError::is_transient()`](crate::ModelmuxError::is_transient)
//! so retryability can be classified without provider-specific
//! knowledge.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use crate::types::{ProviderEvent, Turn, Usage};
use crate::{ModelmuxError, Result};

/// Stream of completion events from one provider call.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent>> + Send>>;

/// A complete (non-incremental) model response.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// One upstream model vendor.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Stream a completion: text fragments terminated by a usage
    /// summary. Dropping the stream aborts the upstream call.
    async fn stream(
        &self,
        model: &str,
        turns: &[Turn],
        temperature: f32,
    ) -> Result<ProviderStream>;

    /// Produce a complete response in one call.
    ///
    /// Default implementation drains [`stream`](Self::stream).
    /// Providers whose non-streaming models reject streamed transport
    /// override this with a native call.
    async fn complete(&self, model: &str, turns: &[Turn], temperature: f32) -> Result<Completion> {
        let mut stream = self.stream(model, turns, temperature).await?;
        let mut text = String::new();
        let mut usage = None;
        while let Some(event) = stream.next().await {
            match event? {
                ProviderEvent::Text(fragment) => text.push_str(&fragment),
                ProviderEvent::Done(final_usage) => {
                    usage = Some(final_usage);
                    break;
                }
            }
        }
        let usage = usage.ok_or_else(|| {
            ModelmuxError::Stream("stream ended without a usage summary".into())
        })?;
        Ok(Completion { text, usage })
    }
}
