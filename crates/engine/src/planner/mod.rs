//! Plan construction.
//!
//! [`Planner::create_plan`] validates a proposed action set, caps it,
//! orders it by dependencies and priority, scores its risk and derives the
//! rollback plan. Validation runs on the full input before capping, and a
//! validation error never yields a partial plan.

mod order;
mod rollback;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use remedy_interchange::{
    ActionSpec, ActionType, ExecutionPlan, IdGenerator, PlanSafety, PlanSummary, RiskLevel,
    UuidIds, HIGH_PRIORITY,
};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

/// Planner tuning, read from the `[planner]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    pub max_actions: usize,
    pub max_retries: u32,
}

impl Default for PlanOptions {
    fn default() -> Self {
        PlanOptions {
            max_actions: 100,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("duplicate action id '{0}'")]
    DuplicateActionId(String),

    #[error("action '{action}' depends on unknown action '{dependency}'")]
    UnknownDependency { action: String, dependency: String },

    #[error("dependency cycle: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },
}

pub struct Planner {
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl Default for Planner {
    fn default() -> Self {
        Planner::new(Arc::new(UuidIds), Arc::new(SystemClock))
    }
}

impl Planner {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Planner { ids, clock }
    }

    pub fn create_plan(
        &self,
        entity_id: &str,
        actions: Vec<ActionSpec>,
        options: &PlanOptions,
    ) -> Result<ExecutionPlan, PlanError> {
        validate(&actions)?;

        let (kept, dropped) = cap(actions, options.max_actions);
        let dropped_ids: Vec<String> = dropped.iter().map(|a| a.id.clone()).collect();
        if !dropped_ids.is_empty() {
            tracing::warn!(
                entity_id,
                max_actions = options.max_actions,
                dropped = dropped_ids.len(),
                "action set exceeds plan limit, lowest-priority actions dropped"
            );
        }

        let kept_index: HashMap<&str, usize> = kept
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.as_str(), i))
            .collect();
        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(kept.len());
        for action in &kept {
            let mut node_deps = Vec::new();
            for dep in &action.metadata.dependencies {
                match kept_index.get(dep.as_str()) {
                    Some(&i) => node_deps.push(i),
                    None => tracing::warn!(
                        action = %action.id,
                        dependency = %dep,
                        "dependency was dropped by capping and no longer constrains order"
                    ),
                }
            }
            deps.push(node_deps);
        }

        let priorities: Vec<i32> = kept.iter().map(ActionSpec::priority).collect();
        let order = order::priority_topo_order(&deps, &priorities);
        let mut slots: Vec<Option<ActionSpec>> = kept.into_iter().map(Some).collect();
        let ordered: Vec<ActionSpec> = order.into_iter().filter_map(|i| slots[i].take()).collect();

        let summary = summarize(&ordered);
        let safety = PlanSafety {
            requires_confirmation: summary.risk_level.requires_confirmation(),
            max_retries: options.max_retries,
            rollback_plan: rollback::rollback_plan(&ordered),
        };
        let plan = ExecutionPlan {
            plan_id: self.ids.next_id("plan"),
            entity_id: entity_id.to_string(),
            created_at: self.clock.now(),
            actions: ordered,
            summary,
            safety,
            dropped_actions: dropped_ids,
        };

        tracing::info!(
            plan_id = %plan.plan_id,
            entity_id,
            actions = plan.actions.len(),
            risk = %plan.summary.risk_level,
            "plan built"
        );
        Ok(plan)
    }
}

// ── Validation ──────────────────────────────────────────────────────────────

fn validate(actions: &[ActionSpec]) -> Result<(), PlanError> {
    let mut index = HashMap::with_capacity(actions.len());
    for (i, action) in actions.iter().enumerate() {
        if index.insert(action.id.as_str(), i).is_some() {
            return Err(PlanError::DuplicateActionId(action.id.clone()));
        }
    }

    let mut deps = Vec::with_capacity(actions.len());
    for action in actions {
        let mut node_deps = Vec::with_capacity(action.metadata.dependencies.len());
        for dep in &action.metadata.dependencies {
            match index.get(dep.as_str()) {
                Some(&i) => node_deps.push(i),
                None => {
                    return Err(PlanError::UnknownDependency {
                        action: action.id.clone(),
                        dependency: dep.clone(),
                    })
                }
            }
        }
        deps.push(node_deps);
    }

    if let Some(cycle) = order::find_cycle(&deps) {
        return Err(PlanError::CycleDetected {
            path: cycle.into_iter().map(|i| actions[i].id.clone()).collect(),
        });
    }
    Ok(())
}

// ── Capping ─────────────────────────────────────────────────────────────────

/// Split into the `max` highest-priority actions (ties by input order) and
/// the rest. Both halves keep input order.
fn cap(actions: Vec<ActionSpec>, max: usize) -> (Vec<ActionSpec>, Vec<ActionSpec>) {
    if actions.len() <= max {
        return (actions, Vec::new());
    }
    let mut ranked: Vec<usize> = (0..actions.len()).collect();
    ranked.sort_by_key(|&i| std::cmp::Reverse(actions[i].priority()));
    let keep: HashSet<usize> = ranked.into_iter().take(max).collect();

    let mut kept = Vec::with_capacity(max);
    let mut dropped = Vec::new();
    for (i, action) in actions.into_iter().enumerate() {
        if keep.contains(&i) {
            kept.push(action);
        } else {
            dropped.push(action);
        }
    }
    (kept, dropped)
}

// ── Summary and risk ────────────────────────────────────────────────────────

/// Estimated wall time of one action, in milliseconds.
pub fn estimated_duration_ms(action_type: ActionType) -> u64 {
    match action_type {
        ActionType::Create => 2000,
        ActionType::Delete => 1500,
        ActionType::Patch => 1000,
        ActionType::Reconnect => 3000,
        ActionType::ClearFlag => 500,
    }
}

pub fn assess_risk(actions: &[ActionSpec]) -> RiskLevel {
    let total = actions.len();
    let destructive = actions
        .iter()
        .filter(|a| a.action_type.is_destructive())
        .count();
    let high_priority = actions
        .iter()
        .filter(|a| a.priority() >= HIGH_PRIORITY)
        .count();

    if destructive > 10 || high_priority > 20 {
        RiskLevel::Critical
    } else if destructive > 5 || total > 50 {
        RiskLevel::High
    } else if destructive > 0 || total > 20 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn summarize(actions: &[ActionSpec]) -> PlanSummary {
    let mut counts_by_type = BTreeMap::new();
    for action in actions {
        *counts_by_type.entry(action.action_type).or_insert(0) += 1;
    }
    PlanSummary {
        total_actions: actions.len(),
        counts_by_type,
        estimated_duration: actions
            .iter()
            .map(|a| estimated_duration_ms(a.action_type))
            .sum(),
        risk_level: assess_risk(actions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use remedy_interchange::SequentialIds;
    use serde_json::json;
    use time::macros::datetime;

    fn planner() -> Planner {
        Planner::new(
            Arc::new(SequentialIds::new()),
            Arc::new(ManualClock::new(datetime!(2026-04-01 10:00 UTC))),
        )
    }

    fn patch(id: &str, priority: i32) -> ActionSpec {
        ActionSpec::new(id, ActionType::Patch, "int-1", "integration", priority)
    }

    fn delete(id: &str) -> ActionSpec {
        ActionSpec::new(id, ActionType::Delete, "int-1", "webhooks", 5)
    }

    #[test]
    fn dependency_orders_before_higher_priority() {
        let actions = vec![patch("B", 9).with_dependencies(["A"]), patch("A", 5)];
        let plan = planner()
            .create_plan("int-1", actions, &PlanOptions::default())
            .unwrap();
        assert_eq!(plan.action_ids(), vec!["A", "B"]);
        assert_eq!(plan.plan_id, "plan-1");
        assert_eq!(plan.created_at, datetime!(2026-04-01 10:00 UTC));
    }

    #[test]
    fn independent_actions_sorted_by_priority_then_input() {
        let actions = vec![patch("a", 1), patch("b", 7), patch("c", 7), patch("d", 3)];
        let plan = planner()
            .create_plan("int-1", actions, &PlanOptions::default())
            .unwrap();
        assert_eq!(plan.action_ids(), vec!["b", "c", "d", "a"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let actions = vec![
            patch("A", 5).with_dependencies(["B"]),
            patch("B", 5).with_dependencies(["A"]),
        ];
        let err = planner()
            .create_plan("int-1", actions, &PlanOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::CycleDetected {
                path: vec!["A".into(), "B".into(), "A".into()]
            }
        );
        assert_eq!(err.to_string(), "dependency cycle: A -> B -> A");
    }

    #[test]
    fn duplicate_and_unknown_ids_are_rejected() {
        let err = planner()
            .create_plan(
                "int-1",
                vec![patch("A", 1), patch("A", 2)],
                &PlanOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err, PlanError::DuplicateActionId("A".into()));

        let err = planner()
            .create_plan(
                "int-1",
                vec![patch("A", 1).with_dependencies(["ghost"])],
                &PlanOptions::default(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownDependency {
                action: "A".into(),
                dependency: "ghost".into()
            }
        );
    }

    #[test]
    fn capping_keeps_highest_priority() {
        // 150 actions with priorities 0..=9 repeating.
        let actions: Vec<ActionSpec> = (0..150)
            .map(|i| patch(&format!("a{i}"), (i % 10) as i32))
            .collect();
        let mut expected: Vec<(i32, usize)> = (0..150).map(|i| ((i % 10) as i32, i)).collect();
        expected.sort_by_key(|&(p, i)| (std::cmp::Reverse(p), i));
        let expected: HashSet<String> = expected[..100]
            .iter()
            .map(|&(_, i)| format!("a{i}"))
            .collect();

        let options = PlanOptions {
            max_actions: 100,
            ..PlanOptions::default()
        };
        let plan = planner().create_plan("int-1", actions, &options).unwrap();
        assert_eq!(plan.actions.len(), 100);
        assert_eq!(plan.dropped_actions.len(), 50);
        let kept: HashSet<String> = plan.actions.iter().map(|a| a.id.clone()).collect();
        assert_eq!(kept, expected);
        let min_kept = plan.actions.iter().map(|a| a.priority()).min().unwrap();
        assert_eq!(min_kept, 3);
    }

    #[test]
    fn dependency_on_dropped_action_no_longer_constrains() {
        let actions = vec![
            patch("low", 0),
            patch("child", 2).with_dependencies(["low"]),
            patch("top", 9),
        ];
        let options = PlanOptions {
            max_actions: 2,
            ..PlanOptions::default()
        };
        let plan = planner().create_plan("int-1", actions, &options).unwrap();
        assert_eq!(plan.action_ids(), vec!["top", "child"]);
        assert_eq!(plan.dropped_actions, vec!["low".to_string()]);
    }

    #[test]
    fn risk_thresholds() {
        let six: Vec<ActionSpec> = (0..6).map(|i| delete(&format!("d{i}"))).collect();
        assert_eq!(assess_risk(&six), RiskLevel::High);
        let five: Vec<ActionSpec> = (0..5).map(|i| delete(&format!("d{i}"))).collect();
        assert_eq!(assess_risk(&five), RiskLevel::Medium);
        let eleven: Vec<ActionSpec> = (0..11).map(|i| delete(&format!("d{i}"))).collect();
        assert_eq!(assess_risk(&eleven), RiskLevel::Critical);

        assert_eq!(assess_risk(&[patch("a", 1)]), RiskLevel::Low);
        let many: Vec<ActionSpec> = (0..21).map(|i| patch(&format!("p{i}"), 1)).collect();
        assert_eq!(assess_risk(&many), RiskLevel::Medium);
        let urgent: Vec<ActionSpec> = (0..21).map(|i| patch(&format!("p{i}"), 8)).collect();
        assert_eq!(assess_risk(&urgent), RiskLevel::Critical);
    }

    #[test]
    fn high_risk_requires_confirmation() {
        let six: Vec<ActionSpec> = (0..6).map(|i| delete(&format!("d{i}"))).collect();
        let plan = planner()
            .create_plan("int-1", six, &PlanOptions::default())
            .unwrap();
        assert_eq!(plan.summary.risk_level, RiskLevel::High);
        assert!(plan.safety.requires_confirmation);
        assert_eq!(plan.summary.counts_by_type[&ActionType::Delete], 6);
        assert_eq!(plan.summary.estimated_duration, 6 * 1500);
    }

    #[test]
    fn rollback_plan_mirrors_forward_order() {
        let actions = vec![
            ActionSpec::new("mk", ActionType::Create, "int-1", "webhooks", 5)
                .with_payload(None, Some(json!({"url": "X"}))),
            patch("fix", 4)
                .with_payload(Some(json!(1)), Some(json!(2)))
                .with_dependencies(["mk"]),
        ];
        let plan = planner()
            .create_plan("int-1", actions, &PlanOptions::default())
            .unwrap();
        let rb = &plan.safety.rollback_plan;
        assert_eq!(rb[0].id, "rollback-fix");
        assert_eq!(rb[1].id, "rollback-mk");
        assert_eq!(rb[1].action_type, ActionType::Delete);
        assert_eq!(rb[1].payload.before, Some(json!({"url": "X"})));
        assert_eq!(plan.safety.max_retries, 3);
    }

    #[test]
    fn empty_action_set_gives_empty_low_risk_plan() {
        let plan = planner()
            .create_plan("int-1", Vec::new(), &PlanOptions::default())
            .unwrap();
        assert!(plan.actions.is_empty());
        assert_eq!(plan.summary.risk_level, RiskLevel::Low);
        assert!(!plan.safety.requires_confirmation);
    }
}
