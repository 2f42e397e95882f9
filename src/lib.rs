//! Modelmux - Request routing and resilience core for multi-provider
//! LLM chat services
//!
//! This crate routes a user's natural-language prompt to one of
//! several model providers: it classifies the prompt, picks the most
//! suitable model for the task and the caller's subscription tier,
//! answers repeats from a bounded response cache, enforces usage
//! quotas and abuse limits, and transparently substitutes an
//! equivalent model when a provider call fails — all while streaming
//! partial output back to the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures_util::StreamExt;
//! use modelmux::{ChatRequest, ChatRouter, MemoryStore, Tier};
//!
//! #[tokio::main]
//! async fn main() -> modelmux::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     store.register("acct-1", Tier::Free);
//!
//!     let router = ChatRouter::builder()
//!         .openai("sk-your-key")
//!         .anthropic("sk-ant-your-key")
//!         .google("your-key")
//!         .store(store)
//!         .build()?;
//!
//!     let mut events = router
//!         .chat(ChatRequest::new(
//!             "acct-1",
//!             "conv-1",
//!             "Write a function to check if a number is prime",
//!         ))
//!         .await?;
//!
//!     while let Some(event) = events.next().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod classify;
pub mod error;
pub mod guard;
pub mod providers;
pub mod router;
pub mod select;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheStats, CachedResponse, ResponseCache};
pub use catalog::{ModelCatalog, ModelDescriptor, ProviderKind};
pub use error::{ModelmuxError, Result};
pub use guard::{AccountSnapshot, GuardConfig, MemoryStore, QuotaGuard, TierLimits, UsageStore};
pub use providers::{
    AnthropicProvider, Completion, CompletionProvider, FailoverConfig, FailoverOrchestrator,
    GoogleProvider, OpenAiProvider, ProviderSet, ProviderStream,
};
pub use router::{ChatRouter, RouteStream, RouterBuilder};
pub use select::{Selection, select_model};

// Re-export all types
pub use types::{
    ChatRequest, LimitKind, PromptAnalysis, ProviderEvent, Role, RouteEvent, TaskCategory, Tier,
    Turn, Usage,
};
