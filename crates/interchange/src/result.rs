//! Outcome of executing a plan.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::action::ActionSpec;

pub const SKIP_OUTSIDE_WINDOW: &str = "outside maintenance window";
pub const SKIP_FATAL_ABORT: &str = "aborted after fatal failure";
pub const SKIP_OPS_LIMIT: &str = "max operations per integration reached";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Success,
    Partial,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedAction {
    pub action: ActionSpec,
    pub attempts: u32,
    /// Set for dry runs: no downstream call was made.
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAction {
    pub action: ActionSpec,
    pub error: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedAction {
    pub action: ActionSpec,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub available: bool,
    pub actions: Vec<ActionSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub plan_id: String,
    pub entity_id: String,
    pub status: ExecutionStatus,
    pub dry_run: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
    pub executed: Vec<ExecutedAction>,
    pub failed: Vec<FailedAction>,
    pub skipped: Vec<SkippedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackInfo>,
}

impl ExecutionResult {
    pub fn executed_ids(&self) -> Vec<&str> {
        self.executed.iter().map(|e| e.action.id.as_str()).collect()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.action.id.as_str()).collect()
    }

    pub fn skipped_ids(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.action.id.as_str()).collect()
    }
}
