//! Builder for configuring router instances

use std::sync::Arc;

use super::ChatRouter;
use crate::cache::{CacheConfig, ResponseCache};
use crate::catalog::{ModelCatalog, ProviderKind};
use crate::guard::{GuardConfig, QuotaGuard, UsageStore};
use crate::providers::{
    AnthropicProvider, CompletionProvider, DEFAULT_STREAM_BUFFER, FailoverConfig,
    FailoverOrchestrator, GoogleProvider, OpenAiProvider, ProviderSet,
};
use crate::{ModelmuxError, Result};

/// Default sampling temperature forwarded to providers.
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Builder for configuring [`ChatRouter`] instances.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use modelmux::{ChatRouter, MemoryStore};
/// # fn main() -> modelmux::Result<()> {
/// let router = ChatRouter::builder()
///     .openai("sk-your-key")
///     .anthropic("sk-ant-your-key")
///     .google("your-key")
///     .store(Arc::new(MemoryStore::new()))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RouterBuilder {
    catalog: Option<ModelCatalog>,
    store: Option<Arc<dyn UsageStore>>,
    providers: ProviderSet,
    cache_config: CacheConfig,
    guard_config: GuardConfig,
    failover_config: FailoverConfig,
    temperature: f32,
    stream_buffer: usize,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            catalog: None,
            store: None,
            providers: ProviderSet::new(),
            cache_config: CacheConfig::default(),
            guard_config: GuardConfig::default(),
            failover_config: FailoverConfig::default(),
            temperature: DEFAULT_TEMPERATURE,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Use a specific catalog instead of the compiled-in seed.
    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the usage store (the external account/counter collaborator).
    pub fn store(mut self, store: Arc<dyn UsageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Configure the OpenAI provider.
    pub fn openai(mut self, api_key: impl Into<String>) -> Self {
        self.providers = self
            .providers
            .with(ProviderKind::OpenAi, Arc::new(OpenAiProvider::new(api_key)));
        self
    }

    /// Configure the Anthropic provider.
    pub fn anthropic(mut self, api_key: impl Into<String>) -> Self {
        self.providers = self.providers.with(
            ProviderKind::Anthropic,
            Arc::new(AnthropicProvider::new(api_key)),
        );
        self
    }

    /// Configure the Google (Gemini) provider.
    pub fn google(mut self, api_key: impl Into<String>) -> Self {
        self.providers = self.providers.with(
            ProviderKind::Google,
            Arc::new(GoogleProvider::new(api_key)),
        );
        self
    }

    /// Register a custom adapter for a vendor (tests, proxies).
    pub fn provider(mut self, kind: ProviderKind, provider: Arc<dyn CompletionProvider>) -> Self {
        self.providers = self.providers.with(kind, provider);
        self
    }

    /// Configure the response cache.
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Configure guard thresholds.
    pub fn guard_config(mut self, config: GuardConfig) -> Self {
        self.guard_config = config;
        self
    }

    /// Configure failover policy.
    pub fn failover_config(mut self, config: FailoverConfig) -> Self {
        self.failover_config = config;
        self
    }

    /// Set the sampling temperature forwarded to providers.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the event-stream backpressure buffer size.
    pub fn stream_buffer(mut self, size: usize) -> Self {
        self.stream_buffer = size;
        self
    }

    /// Build the router.
    ///
    /// Requires a usage store and at least one provider; loads the
    /// compiled-in catalog when none was supplied.
    pub fn build(self) -> Result<ChatRouter> {
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => ModelCatalog::builtin()?,
        };
        let store = self.store.ok_or_else(|| {
            ModelmuxError::Configuration("no usage store configured".into())
        })?;
        if self.providers.is_empty() {
            return Err(ModelmuxError::Configuration(
                "no providers configured".into(),
            ));
        }

        let guard = Arc::new(QuotaGuard::with_config(
            Arc::clone(&store),
            self.guard_config,
        ));

        Ok(ChatRouter {
            catalog: Arc::new(catalog),
            cache: Arc::new(ResponseCache::new(self.cache_config)),
            guard,
            store,
            orchestrator: FailoverOrchestrator::with_config(
                self.providers,
                self.failover_config,
            ),
            temperature: self.temperature,
            stream_buffer: self.stream_buffer,
        })
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::MemoryStore;

    #[test]
    fn build_requires_a_store() {
        let err = ChatRouter::builder().openai("key").build().unwrap_err();
        assert!(matches!(err, ModelmuxError::Configuration(_)));
    }

    #[test]
    fn build_requires_a_provider() {
        let err = ChatRouter::builder()
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelmuxError::Configuration(_)));
    }

    #[test]
    fn build_with_defaults_uses_builtin_catalog() {
        let router = ChatRouter::builder()
            .store(Arc::new(MemoryStore::new()))
            .openai("key")
            .build()
            .unwrap();
        assert!(!router.catalog().is_empty());
    }
}
