use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Outcome of the most recent processing attempt for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProcessingStatus {
    /// Issues were found but nothing was changed yet.
    Detected,
    Remediated,
    Failed,
    Skipped,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 4] = [
        ProcessingStatus::Detected,
        ProcessingStatus::Remediated,
        ProcessingStatus::Failed,
        ProcessingStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Detected => "Detected",
            ProcessingStatus::Remediated => "Remediated",
            ProcessingStatus::Failed => "Failed",
            ProcessingStatus::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single ledger row kept per entity.
///
/// Every processing attempt overwrites the row; no history is retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRecord {
    pub entity_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_processed_at: OffsetDateTime,
    pub last_issue_signature: String,
    pub last_action_signature: String,
    pub status: ProcessingStatus,
    pub operator_id: String,
    pub session_id: String,
    pub issue_count: usize,
    pub action_count: usize,
}

/// Half-open range over `last_processed_at`: `from` inclusive, `to` exclusive.
/// A missing bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: OffsetDateTime, to: OffsetDateTime) -> Self {
        TimeRange {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }
}
