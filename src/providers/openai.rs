//! OpenAI chat-completions adapter.
//!
//! Streams `data:`-line SSE terminated by a `[DONE]` sentinel. Usage
//! arrives in the final data chunk when `stream_options.include_usage`
//! is set. Reasoning-oriented models that reject streamed transport go
//! through [`CompletionProvider::complete`], which this adapter
//! implements natively.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;

use super::error_for_response;
use super::traits::{Completion, CompletionProvider, ProviderStream};
use crate::types::{ProviderEvent, Turn, Usage};
use crate::{ModelmuxError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for the OpenAI chat completions API.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
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

    fn request_body(model: &str, turns: &[Turn], temperature: f32, stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = turns
            .iter()
            .map(|t| json!({ "role": t.role.as_str(), "content": t.content }))
            .collect();
        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    async fn send(&self, body: serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream(
        &self,
        model: &str,
        turns: &[Turn],
        temperature: f32,
    ) -> Result<ProviderStream> {
        let body = Self::request_body(model, turns, temperature, true);
        let response = self.send(body).await?;
        let mut events = response.bytes_stream().eventsource();

        Ok(Box::pin(async_stream::try_stream! {
            let mut usage = Usage::default();
            while let Some(event) = events.next().await {
                let event =
                    event.map_err(|e| ModelmuxError::Stream(e.to_string()))?;
                if event.data == "[DONE]" {
                    break;
                }
                // Malformed frames are skipped; the terminal sentinel
                // still closes the stream cleanly.
                let Ok(chunk) = serde_json::from_str::<StreamFrame>(&event.data) else {
                    continue;
                };
                if let Some(wire) = chunk.usage {
                    usage = wire.into();
                }
                for choice in chunk.choices {
                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            yield ProviderEvent::Text(text);
                        }
                    }
                }
            }
            yield ProviderEvent::Done(usage);
        }))
    }

    async fn complete(&self, model: &str, turns: &[Turn], temperature: f32) -> Result<Completion> {
        let body = Self::request_body(model, turns, temperature, false);
        let response = self.send(body).await?;
        let completion: CompletionFrame = response.json().await?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ModelmuxError::Api {
                status: 200,
                message: "response contained no choices".into(),
            })?;
        Ok(Completion {
            text,
            usage: completion.usage.map(Usage::from).unwrap_or_default(),
        })
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(wire: WireUsage) -> Self {
        Usage {
            input_tokens: wire.prompt_tokens,
            output_tokens: wire.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionFrame {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}
