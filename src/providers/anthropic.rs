//! Anthropic messages adapter.
//!
//! Streams named-event SSE: `message_start` carries input-token usage,
//! `content_block_delta` carries text, `message_delta` carries
//! output-token usage, `message_stop` ends the stream. The API takes
//! the system prompt as a separate field, so system turns are split
//! out of the message list before the request is built.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;

use super::error_for_response;
use super::traits::{CompletionProvider, ProviderStream};
use crate::types::{ProviderEvent, Role, Turn, Usage};
use crate::{ModelmuxError, Result};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;

/// Adapter for the Anthropic messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create an adapter with the production endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (testing, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Use a pre-configured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn stream(
        &self,
        model: &str,
        turns: &[Turn],
        temperature: f32,
    ) -> Result<ProviderStream> {
        let system: Option<&str> = turns
            .iter()
            .find(|t| t.role == Role::System)
            .map(|t| t.content.as_str());
        let messages: Vec<serde_json::Value> = turns
            .iter()
            .filter(|t| t.role != Role::System)
            .map(|t| json!({ "role": t.role.as_str(), "content": t.content }))
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "stream": true,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let mut events = response.bytes_stream().eventsource();

        Ok(Box::pin(async_stream::try_stream! {
            let mut usage = Usage::default();
            while let Some(event) = events.next().await {
                let event =
                    event.map_err(|e| ModelmuxError::Stream(e.to_string()))?;
                match event.event.as_str() {
                    "message_start" => {
                        if let Ok(start) = serde_json::from_str::<MessageStart>(&event.data) {
                            usage.input_tokens = start.message.usage.input_tokens;
                        }
                    }
                    "content_block_delta" => {
                        if let Ok(delta) = serde_json::from_str::<ContentBlockDelta>(&event.data) {
                            if let Some(text) = delta.delta.text {
                                if !text.is_empty() {
                                    yield ProviderEvent::Text(text);
                                }
                            }
                        }
                    }
                    "message_delta" => {
                        if let Ok(delta) = serde_json::from_str::<MessageDelta>(&event.data) {
                            if let Some(wire) = delta.usage {
                                usage.output_tokens = wire.output_tokens;
                            }
                        }
                    }
                    "message_stop" => break,
                    "error" => {
                        let parsed = serde_json::from_str::<StreamError>(&event.data).ok();
                        Err::<(), _>(stream_error(parsed))?;
                    }
                    // Unknown event types are skipped per the API's
                    // versioning policy; ping is just a keep-alive.
                    _ => {}
                }
            }
            yield ProviderEvent::Done(usage);
        }))
    }
}

/// Map a mid-stream error event to an error category.
fn stream_error(parsed: Option<StreamError>) -> ModelmuxError {
    match parsed {
        Some(err) if err.error.error_type == "overloaded_error" => {
            ModelmuxError::Unavailable(err.error.message)
        }
        Some(err) if err.error.error_type == "rate_limit_error" => {
            ModelmuxError::RateLimited { retry_after: None }
        }
        Some(err) => ModelmuxError::Stream(err.error.message),
        None => ModelmuxError::Stream("unparseable error event".into()),
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MessageStart {
    message: MessageStartBody,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    delta: DeltaBody,
}

#[derive(Debug, Deserialize)]
struct DeltaBody {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    error: StreamErrorBody,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
