//! Quota limit kinds

use serde::{Deserialize, Serialize};

/// Which ceiling a quota denial tripped.
///
/// Carried on [`ModelmuxError::QuotaExceeded`](crate::ModelmuxError::QuotaExceeded)
/// so callers can decide whether and when to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    MonthlyTokens,
    RequestTokens,
    Minute,
    Hour,
    Day,
    /// Anonymous trial allowance spent.
    Trial,
}

impl LimitKind {
    /// Stable label name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::MonthlyTokens => "monthly_tokens",
            LimitKind::RequestTokens => "request_tokens",
            LimitKind::Minute => "minute",
            LimitKind::Hour => "hour",
            LimitKind::Day => "day",
            LimitKind::Trial => "trial",
        }
    }
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
