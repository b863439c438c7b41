//! Proposed corrective actions.
//!
//! An [`ActionSpec`] is one atomic change against an integration record. The
//! rule evaluator proposes them; the planner orders them; executors apply
//! them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Priority at or above which an action counts as high priority for risk
/// scoring.
pub const HIGH_PRIORITY: i32 = 8;

/// Priority at or above which a failed action aborts the rest of its plan.
pub const FATAL_PRIORITY: i32 = 9;

/// Priority assigned to every generated rollback action.
pub const ROLLBACK_PRIORITY: i32 = 0;

/// The kind of change an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Create,
    Delete,
    Patch,
    Reconnect,
    ClearFlag,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "Create",
            ActionType::Delete => "Delete",
            ActionType::Patch => "Patch",
            ActionType::Reconnect => "Reconnect",
            ActionType::ClearFlag => "ClearFlag",
        }
    }

    /// Whether the action removes data downstream.
    pub fn is_destructive(&self) -> bool {
        matches!(self, ActionType::Delete)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an action points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTarget {
    pub entity_id: String,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Field path inside the resource (e.g. `config.webhook.url`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Prior and desired values carried by an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Value>,
}

impl ActionPayload {
    /// The same payload with `before` and `after` exchanged.
    pub fn swapped(&self) -> ActionPayload {
        ActionPayload {
            before: self.after.clone(),
            after: self.before.clone(),
            diff: self.diff.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    pub reason: String,
    pub priority: i32,
    /// Ids of actions in the same set that must run first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub rollbackable: bool,
}

/// A single proposed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Unique within its plan or job.
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub target: ActionTarget,
    #[serde(default)]
    pub payload: ActionPayload,
    pub metadata: ActionMetadata,
}

impl ActionSpec {
    /// Build an action with empty payload, no dependencies, retryable and
    /// rollbackable.
    pub fn new(
        id: impl Into<String>,
        action_type: ActionType,
        entity_id: impl Into<String>,
        resource_type: impl Into<String>,
        priority: i32,
    ) -> Self {
        ActionSpec {
            id: id.into(),
            action_type,
            target: ActionTarget {
                entity_id: entity_id.into(),
                resource_type: resource_type.into(),
                resource_id: None,
                path: None,
            },
            payload: ActionPayload::default(),
            metadata: ActionMetadata {
                reason: String::new(),
                priority,
                dependencies: Vec::new(),
                retryable: true,
                rollbackable: true,
            },
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_payload(mut self, before: Option<Value>, after: Option<Value>) -> Self {
        self.payload.before = before;
        self.payload.after = after;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.metadata.reason = reason.into();
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.target.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.target.path = Some(path.into());
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.metadata.retryable = retryable;
        self
    }

    pub fn rollbackable(mut self, rollbackable: bool) -> Self {
        self.metadata.rollbackable = rollbackable;
        self
    }

    pub fn priority(&self) -> i32 {
        self.metadata.priority
    }

    /// A failure of this action aborts the remainder of its plan.
    pub fn is_fatal_on_failure(&self) -> bool {
        self.metadata.priority >= FATAL_PRIORITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_serializes_with_type_key_and_camel_case() {
        let action = ActionSpec::new("a1", ActionType::ClearFlag, "int-1", "integration", 4)
            .with_resource_id("hook-7")
            .with_reason("stale flag");

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "ClearFlag");
        assert_eq!(json["target"]["entityId"], "int-1");
        assert_eq!(json["target"]["resourceId"], "hook-7");
        assert!(json["target"].get("path").is_none());
        assert_eq!(json["metadata"]["priority"], 4);
        assert_eq!(json["metadata"]["reason"], "stale flag");
    }

    #[test]
    fn action_deserializes_with_defaults() {
        let action: ActionSpec = serde_json::from_value(json!({
            "id": "x",
            "type": "Delete",
            "target": { "entityId": "e", "resourceType": "webhook" },
            "metadata": { "reason": "orphan", "priority": 7 }
        }))
        .unwrap();

        assert_eq!(action.action_type, ActionType::Delete);
        assert!(action.metadata.dependencies.is_empty());
        assert!(!action.metadata.retryable);
        assert!(!action.metadata.rollbackable);
        assert_eq!(action.payload, ActionPayload::default());
    }

    #[test]
    fn swapped_payload_exchanges_before_and_after() {
        let payload = ActionPayload {
            before: Some(json!("old")),
            after: Some(json!("new")),
            diff: None,
        };
        let swapped = payload.swapped();
        assert_eq!(swapped.before, Some(json!("new")));
        assert_eq!(swapped.after, Some(json!("old")));
    }

    #[test]
    fn fatal_threshold() {
        let low = ActionSpec::new("a", ActionType::Patch, "e", "r", 8);
        let high = ActionSpec::new("b", ActionType::Patch, "e", "r", 9);
        assert!(!low.is_fatal_on_failure());
        assert!(high.is_fatal_on_failure());
    }
}
