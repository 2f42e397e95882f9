//! Prompt analysis output

use serde::{Deserialize, Serialize};

use super::TaskCategory;

/// Result of classifying a raw prompt.
///
/// Ephemeral — recomputed on every request, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptAnalysis {
    /// The winning task category.
    pub category: TaskCategory,
    /// Winning score over total score, in `0.0..=1.0`. 0.5 when the
    /// prompt carried no signal at all.
    pub confidence: f32,
    /// Rough input size at 4 characters per token. Used only for quota
    /// pre-checks, never for billing.
    pub estimated_input_tokens: u32,
}
