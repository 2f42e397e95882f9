//! Inbound chat request

use serde::{Deserialize, Serialize};

use super::Turn;

/// A single inbound chat call, transport-agnostic.
///
/// The caller's tier and counters live in the external account store;
/// the request only carries the identifiers needed to look them up.
/// Anonymous trial use is modelled as a caller-supplied remaining
/// allowance rather than state this core reads or writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Account id, or an anonymous session token for trial use.
    pub account_id: String,
    /// Conversation the message belongs to.
    pub conversation_id: String,
    /// The user's message text.
    pub message: String,
    /// Prior turns, oldest first. The last few feed the cache key and
    /// the upstream call.
    #[serde(default)]
    pub history: Vec<Turn>,
    /// Remaining anonymous-trial allowance, when the caller tracks one.
    /// `Some(0)` rejects the request before any other work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_remaining: Option<u32>,
}

impl ChatRequest {
    /// Create a request with no history.
    pub fn new(
        account_id: impl Into<String>,
        conversation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            conversation_id: conversation_id.into(),
            message: message.into(),
            history: Vec::new(),
            trial_remaining: None,
        }
    }

    /// Attach conversation history (oldest first).
    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    /// Attach an anonymous-trial allowance.
    pub fn with_trial_remaining(mut self, remaining: u32) -> Self {
        self.trial_remaining = Some(remaining);
        self
    }
}
