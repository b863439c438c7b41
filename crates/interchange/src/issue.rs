//! Findings from the rule evaluator and the batch format that carries them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::action::ActionSpec;

/// A rule violation detected on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub rule_id: String,
    pub severity: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
    /// Volatile: excluded from issue signatures.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub detected_at: Option<OffsetDateTime>,
}

impl Issue {
    pub fn new(
        rule_id: impl Into<String>,
        severity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Issue {
            rule_id: rule_id.into(),
            severity: severity.into(),
            message: message.into(),
            field: None,
            details: Value::Null,
            detected_at: None,
        }
    }
}

/// Proposed actions for one entity, as supplied by the rule evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBatch {
    pub entity_id: String,
    #[serde(default)]
    pub issues: Vec<Issue>,
    pub actions: Vec<ActionSpec>,
}
