//! Refresh and routing outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefreshOutcome {
    Skipped,
    Refreshed,
    Error,
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Skipped => "SKIPPED",
            Self::Refreshed => "REFRESHED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Structured status returned by every refresh, never thrown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub outcome: RefreshOutcome,
    pub message: String,
    /// Rows written, REFRESHED only.
    pub rows_refreshed: Option<u64>,
    /// Wall-clock duration in milliseconds, REFRESHED only.
    pub duration_ms: Option<f64>,
}

impl RefreshStatus {
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            outcome: RefreshOutcome::Skipped,
            message: message.into(),
            rows_refreshed: None,
            duration_ms: None,
        }
    }

    pub fn refreshed(rows: u64, duration_ms: f64) -> Self {
        Self {
            outcome: RefreshOutcome::Refreshed,
            message: "Cache refreshed successfully".to_string(),
            rows_refreshed: Some(rows),
            duration_ms: Some(duration_ms),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            outcome: RefreshOutcome::Error,
            message: message.into(),
            rows_refreshed: None,
            duration_ms: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome == RefreshOutcome::Error
    }

    pub fn is_refreshed(&self) -> bool {
        self.outcome == RefreshOutcome::Refreshed
    }
}

/// Where a routed query is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStrategy {
    /// Every referenced table rewritten to its materialized copy.
    Cache,
    /// Original text forwarded to the warehouse.
    Passthrough,
}

impl fmt::Display for RouteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("CACHE"),
            Self::Passthrough => f.write_str("PASSTHROUGH"),
        }
    }
}
