//! Google Gemini adapter.
//!
//! Streams `streamGenerateContent?alt=sse` responses: each SSE data
//! payload is a JSON object with candidate content parts and, on later
//! frames, cumulative `usageMetadata`. There is no terminal sentinel —
//! the stream simply ends, at which point the adapter emits the final
//! usage summary. Gemini has no system role; system turns are folded
//! into the first user message.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;

use super::error_for_response;
use super::traits::{CompletionProvider, ProviderStream};
use crate::types::{ProviderEvent, Role, Turn, Usage};
use crate::{ModelmuxError, Result};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Adapter for the Google Gemini generateContent API.
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
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

    /// Convert turns to Gemini contents. The assistant role maps to
    /// "model"; system turns are prepended to the first user message.
    fn contents(turns: &[Turn]) -> Vec<serde_json::Value> {
        let system: Vec<&str> = turns
            .iter()
            .filter(|t| t.role == Role::System)
            .map(|t| t.content.as_str())
            .collect();
        let mut system_prefix = system.join("\n");

        turns
            .iter()
            .filter(|t| t.role != Role::System)
            .map(|t| {
                let role = match t.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                let text = if role == "user" && !system_prefix.is_empty() {
                    let merged = format!("{}\n\n{}", system_prefix, t.content);
                    system_prefix.clear();
                    merged
                } else {
                    t.content.clone()
                };
                json!({ "role": role, "parts": [{ "text": text }] })
            })
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn stream(
        &self,
        model: &str,
        turns: &[Turn],
        temperature: f32,
    ) -> Result<ProviderStream> {
        let body = json!({
            "contents": Self::contents(turns),
            "generationConfig": { "temperature": temperature },
        });

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, model, self.api_key
        );
        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let mut events = response.bytes_stream().eventsource();

        Ok(Box::pin(async_stream::try_stream! {
            let mut usage = Usage::default();
            while let Some(event) = events.next().await {
                let event =
                    event.map_err(|e| ModelmuxError::Stream(e.to_string()))?;
                let Ok(frame) = serde_json::from_str::<StreamFrame>(&event.data) else {
                    continue;
                };
                if let Some(meta) = frame.usage_metadata {
                    usage = Usage {
                        input_tokens: meta.prompt_token_count,
                        output_tokens: meta.candidates_token_count,
                    };
                }
                for candidate in frame.candidates {
                    for part in candidate.content.parts {
                        if let Some(text) = part.text {
                            if !text.is_empty() {
                                yield ProviderEvent::Text(text);
                            }
                        }
                    }
                }
            }
            yield ProviderEvent::Done(usage);
        }))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_turn_folds_into_first_user_message() {
        let turns = vec![
            Turn::system("Be terse."),
            Turn::user("hello"),
            Turn::assistant("hi"),
            Turn::user("bye"),
        ];
        let contents = GoogleProvider::contents(&turns);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Be terse.\n\nhello");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "bye");
    }
}
