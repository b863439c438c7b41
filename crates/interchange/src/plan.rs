//! Execution plans produced by the planner.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::action::{ActionSpec, ActionType};

/// Coarse risk classification of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Plans at this level must be explicitly confirmed before execution.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub total_actions: usize,
    pub counts_by_type: BTreeMap<ActionType, usize>,
    /// Estimated wall-clock duration in milliseconds.
    pub estimated_duration: u64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSafety {
    pub requires_confirmation: bool,
    pub max_retries: u32,
    /// Inverse actions, already in execution order (reverse of forward order).
    pub rollback_plan: Vec<ActionSpec>,
}

/// An ordered, risk-scored set of actions for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub plan_id: String,
    pub entity_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Topologically ordered by dependencies, then by descending priority.
    pub actions: Vec<ActionSpec>,
    pub summary: PlanSummary,
    pub safety: PlanSafety,
    /// Ids removed because the input exceeded the action cap.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_actions: Vec<String>,
}

impl ExecutionPlan {
    pub fn destructive_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type.is_destructive())
            .count()
    }

    pub fn action_ids(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.id.as_str()).collect()
    }
}
