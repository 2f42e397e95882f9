//! Task categories used to rank candidate models

use serde::{Deserialize, Serialize};

/// Coarse classification of a prompt's intent.
///
/// Categories index into each model's per-category capability ranks,
/// so the selector can route a coding prompt to a strong coding model
/// and a casual question to a cheap conversational one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Coding,
    Creative,
    Math,
    Casual,
    DataAnalysis,
}

impl TaskCategory {
    /// All categories, in scoring order.
    pub const ALL: [TaskCategory; 5] = [
        TaskCategory::Coding,
        TaskCategory::Creative,
        TaskCategory::Math,
        TaskCategory::Casual,
        TaskCategory::DataAnalysis,
    ];

    /// Stable wire/label name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Coding => "coding",
            TaskCategory::Creative => "creative",
            TaskCategory::Math => "math",
            TaskCategory::Casual => "casual",
            TaskCategory::DataAnalysis => "data_analysis",
        }
    }

    /// Human-readable description used in selection reasons.
    pub fn description(&self) -> &'static str {
        match self {
            TaskCategory::Coding => "coding and technical tasks",
            TaskCategory::Creative => "creative writing and content generation",
            TaskCategory::Math => "mathematical reasoning and calculations",
            TaskCategory::Casual => "general conversation",
            TaskCategory::DataAnalysis => "data analysis and summarization",
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
