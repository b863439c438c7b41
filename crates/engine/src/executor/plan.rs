//! Plan execution with preflight checks, retries, rate limiting, maintenance
//! windows and abort-on-fatal.

use remedy_interchange::{
    ExecutedAction, ExecutionPlan, ExecutionResult, ExecutionStatus, FailedAction, RiskLevel,
    RollbackInfo, SkippedAction, SKIP_FATAL_ABORT, SKIP_OPS_LIMIT, SKIP_OUTSIDE_WINDOW,
};
use serde::{Deserialize, Serialize};

use super::retry::{execute_with_retry, RateLimit, RetryPolicy};
use super::ActionExecutor;
use crate::clock::Clock;
use crate::window::MaintenanceWindow;

/// Settings for [`execute_plan`], read from the `[execution]` config section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub dry_run: bool,
    /// Cap on actions attempted per plan; `None` means unlimited.
    pub max_ops_per_integration: Option<usize>,
    pub rate_limit: RateLimit,
    pub retries: RetryPolicy,
    pub safety: SafetyOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyOptions {
    /// Operator confirmation for this run, required by high and critical
    /// risk plans. Never read from config.
    #[serde(skip)]
    pub confirmed: bool,
    pub allow_destructive: bool,
    pub maintenance_window: Option<MaintenanceWindow>,
}

impl Default for SafetyOptions {
    fn default() -> Self {
        SafetyOptions {
            confirmed: false,
            allow_destructive: false,
            maintenance_window: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreflightError {
    #[error("outside maintenance window ({window})")]
    OutsideMaintenanceWindow { window: String },

    #[error("plan is {risk} risk and requires operator confirmation")]
    ConfirmationRequired { risk: RiskLevel },

    #[error("plan contains {count} destructive action(s) but destructive actions are not allowed")]
    DestructiveNotAllowed { count: usize },
}

/// Check the plan against the safety options without running anything.
pub fn preflight(
    plan: &ExecutionPlan,
    safety: &SafetyOptions,
    clock: &dyn Clock,
) -> Result<(), PreflightError> {
    if let Some(window) = &safety.maintenance_window {
        if !window.contains(clock.now()) {
            return Err(PreflightError::OutsideMaintenanceWindow {
                window: window.to_string(),
            });
        }
    }
    if plan.safety.requires_confirmation && !safety.confirmed {
        return Err(PreflightError::ConfirmationRequired {
            risk: plan.summary.risk_level,
        });
    }
    let destructive = plan.destructive_count();
    if destructive > 0 && !safety.allow_destructive {
        return Err(PreflightError::DestructiveNotAllowed { count: destructive });
    }
    Ok(())
}

/// Run a plan's actions in order.
///
/// Preflight failures are returned as errors before any action runs. Action
/// failures are reported in the result. Once a fatal-priority action fails,
/// the remaining actions are skipped and the rollback plan is attached.
pub async fn execute_plan(
    plan: &ExecutionPlan,
    executor: &dyn ActionExecutor,
    options: &ExecutionOptions,
    clock: &dyn Clock,
) -> Result<ExecutionResult, PreflightError> {
    preflight(plan, &options.safety, clock)?;

    let started_at = clock.now();
    let mut executed = Vec::new();
    let mut failed = Vec::new();
    let mut skipped = Vec::new();
    let mut attempted = 0usize;
    let mut aborted = false;

    for action in &plan.actions {
        if aborted {
            skipped.push(SkippedAction {
                action: action.clone(),
                reason: SKIP_FATAL_ABORT.to_string(),
            });
            continue;
        }
        if let Some(window) = &options.safety.maintenance_window {
            if !window.contains(clock.now()) {
                skipped.push(SkippedAction {
                    action: action.clone(),
                    reason: SKIP_OUTSIDE_WINDOW.to_string(),
                });
                continue;
            }
        }
        if let Some(max) = options.max_ops_per_integration {
            if attempted >= max {
                skipped.push(SkippedAction {
                    action: action.clone(),
                    reason: SKIP_OPS_LIMIT.to_string(),
                });
                continue;
            }
        }

        attempted += 1;
        if options.dry_run {
            executed.push(ExecutedAction {
                action: action.clone(),
                attempts: 0,
                simulated: true,
                detail: None,
            });
        } else {
            let outcome = execute_with_retry(executor, action, &options.retries).await;
            match outcome.result {
                Ok(done) => executed.push(ExecutedAction {
                    action: action.clone(),
                    attempts: outcome.attempts,
                    simulated: false,
                    detail: done.detail,
                }),
                Err(err) => {
                    if action.is_fatal_on_failure() {
                        tracing::error!(
                            plan_id = %plan.plan_id,
                            action = %action.id,
                            error = %err,
                            "fatal action failed, aborting plan"
                        );
                        aborted = true;
                    } else {
                        tracing::warn!(
                            plan_id = %plan.plan_id,
                            action = %action.id,
                            attempts = outcome.attempts,
                            error = %err,
                            "action failed"
                        );
                    }
                    failed.push(FailedAction {
                        action: action.clone(),
                        error: err.to_string(),
                        attempts: outcome.attempts,
                    });
                }
            }
        }
        options.rate_limit.pause().await;
    }

    let status = if aborted {
        ExecutionStatus::Failed
    } else if failed.is_empty() {
        ExecutionStatus::Success
    } else if !executed.is_empty() {
        ExecutionStatus::Partial
    } else {
        ExecutionStatus::Failed
    };
    let rollback = (status == ExecutionStatus::Failed).then(|| RollbackInfo {
        available: !plan.safety.rollback_plan.is_empty(),
        actions: plan.safety.rollback_plan.clone(),
    });

    tracing::info!(
        plan_id = %plan.plan_id,
        entity_id = %plan.entity_id,
        status = ?status,
        executed = executed.len(),
        failed = failed.len(),
        skipped = skipped.len(),
        dry_run = options.dry_run,
        "plan finished"
    );

    Ok(ExecutionResult {
        plan_id: plan.plan_id.clone(),
        entity_id: plan.entity_id.clone(),
        status,
        dry_run: options.dry_run,
        started_at,
        completed_at: clock.now(),
        executed,
        failed,
        skipped,
        rollback,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::executor::{ActionError, ScriptedExecutor};
    use crate::planner::{PlanOptions, Planner};
    use remedy_interchange::{ActionSpec, ActionType, SequentialIds};
    use serde_json::json;
    use time::macros::{datetime, time};

    const NOON: time::OffsetDateTime = datetime!(2026-04-01 12:00 UTC);

    fn patch(id: &str, priority: i32) -> ActionSpec {
        ActionSpec::new(id, ActionType::Patch, "int-1", "integration", priority)
            .with_payload(Some(json!(0)), Some(json!(1)))
    }

    fn plan_of(actions: Vec<ActionSpec>) -> ExecutionPlan {
        Planner::new(Arc::new(SequentialIds::new()), Arc::new(ManualClock::new(NOON)))
            .create_plan("int-1", actions, &PlanOptions::default())
            .unwrap()
    }

    fn fast() -> ExecutionOptions {
        ExecutionOptions {
            rate_limit: RateLimit {
                actions_per_second: 0.0,
            },
            ..ExecutionOptions::default()
        }
    }

    #[tokio::test]
    async fn all_succeed() {
        let plan = plan_of(vec![patch("a", 5), patch("b", 4)]);
        let exec = ScriptedExecutor::new();
        let clock = ManualClock::new(NOON);
        let result = execute_plan(&plan, &exec, &fast(), &clock).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.executed_ids(), vec!["a", "b"]);
        assert!(result.rollback.is_none());
        assert!(!result.executed[0].simulated);
    }

    #[tokio::test]
    async fn fatal_failure_aborts_the_rest() {
        let plan = plan_of(vec![patch("first", 9), patch("second", 5), patch("third", 4)]);
        let exec = ScriptedExecutor::new().always_fail("first", ActionError::Fatal("boom".into()));
        let clock = ManualClock::new(NOON);
        let result = execute_plan(&plan, &exec, &fast(), &clock).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.executed.is_empty());
        assert_eq!(result.failed_ids(), vec!["first"]);
        assert_eq!(result.skipped_ids(), vec!["second", "third"]);
        assert!(result.skipped.iter().all(|s| s.reason == SKIP_FATAL_ABORT));
        assert_eq!(exec.calls(), vec!["first"]);

        let rollback = result.rollback.unwrap();
        assert!(rollback.available);
        assert_eq!(rollback.actions, plan.safety.rollback_plan);
    }

    #[tokio::test]
    async fn fatal_failure_after_success_is_failed_not_partial() {
        let plan = plan_of(vec![
            patch("ok", 5),
            patch("critical", 9).with_dependencies(["ok"]),
            patch("later", 3),
        ]);
        assert_eq!(plan.actions[0].id, "ok");
        assert_eq!(plan.actions[1].id, "critical");
        let exec =
            ScriptedExecutor::new().always_fail("critical", ActionError::Fatal("boom".into()));
        let clock = ManualClock::new(NOON);
        let result = execute_plan(&plan, &exec, &fast(), &clock).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.executed_ids(), vec!["ok"]);
        assert_eq!(result.failed_ids(), vec!["critical"]);
        assert_eq!(result.skipped_ids(), vec!["later"]);
        assert_eq!(result.skipped[0].reason, SKIP_FATAL_ABORT);
        assert!(result.rollback.is_some());
    }

    #[tokio::test]
    async fn non_fatal_failure_gives_partial() {
        let plan = plan_of(vec![patch("ok", 5), patch("bad", 3)]);
        let exec = ScriptedExecutor::new().always_fail("bad", ActionError::Fatal("400".into()));
        let clock = ManualClock::new(NOON);
        let result = execute_plan(&plan, &exec, &fast(), &clock).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Partial);
        assert_eq!(result.failed[0].error, "400");
        assert!(result.rollback.is_none());
    }

    #[tokio::test]
    async fn only_failures_is_failed_with_rollback() {
        let plan = plan_of(vec![patch("bad", 3)]);
        let exec = ScriptedExecutor::new().always_fail("bad", ActionError::Fatal("400".into()));
        let clock = ManualClock::new(NOON);
        let result = execute_plan(&plan, &exec, &fast(), &clock).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.rollback.is_some());
    }

    #[tokio::test]
    async fn dry_run_never_calls_executor() {
        let plan = plan_of(vec![patch("a", 5), patch("b", 5)]);
        let exec = ScriptedExecutor::new();
        let clock = ManualClock::new(NOON);
        let options = ExecutionOptions {
            dry_run: true,
            ..fast()
        };
        let result = execute_plan(&plan, &exec, &options, &clock).await.unwrap();
        assert!(result.dry_run);
        assert!(result.executed.iter().all(|e| e.simulated));
        assert!(exec.calls().is_empty());
        assert_eq!(result.status, ExecutionStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_paces_actions() {
        let plan = plan_of(vec![patch("a", 5), patch("b", 5), patch("c", 5)]);
        let exec = ScriptedExecutor::new();
        let clock = ManualClock::new(NOON);
        let options = ExecutionOptions {
            rate_limit: RateLimit {
                actions_per_second: 2.0,
            },
            ..ExecutionOptions::default()
        };
        let start = tokio::time::Instant::now();
        execute_plan(&plan, &exec, &options, &clock).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn ops_limit_skips_excess_actions() {
        let plan = plan_of(vec![patch("a", 5), patch("b", 4), patch("c", 3)]);
        let exec = ScriptedExecutor::new();
        let clock = ManualClock::new(NOON);
        let options = ExecutionOptions {
            max_ops_per_integration: Some(2),
            ..fast()
        };
        let result = execute_plan(&plan, &exec, &options, &clock).await.unwrap();
        assert_eq!(result.executed_ids(), vec!["a", "b"]);
        assert_eq!(result.skipped[0].reason, SKIP_OPS_LIMIT);
        assert_eq!(result.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn preflight_rejects_outside_window() {
        let plan = plan_of(vec![patch("a", 5)]);
        let exec = ScriptedExecutor::new();
        let clock = ManualClock::new(NOON);
        let mut options = fast();
        options.safety.maintenance_window =
            Some(MaintenanceWindow::new(time!(22:00), time!(04:00)));
        let err = execute_plan(&plan, &exec, &options, &clock)
            .await
            .unwrap_err();
        assert!(matches!(err, PreflightError::OutsideMaintenanceWindow { .. }));
        assert!(exec.calls().is_empty());
    }

    /// The window closes while the plan is running.
    struct ClosingWindowExecutor {
        clock: Arc<ManualClock>,
        inner: ScriptedExecutor,
    }

    #[async_trait::async_trait]
    impl ActionExecutor for ClosingWindowExecutor {
        async fn execute_action(
            &self,
            action: &ActionSpec,
        ) -> Result<crate::executor::ActionOutcome, ActionError> {
            let out = self.inner.execute_action(action).await;
            self.clock.advance(Duration::from_secs(3600));
            out
        }
    }

    #[tokio::test]
    async fn actions_after_window_closes_are_skipped() {
        let plan = plan_of(vec![patch("a", 5), patch("b", 4)]);
        let clock = Arc::new(ManualClock::new(datetime!(2026-04-01 11:30 UTC)));
        let exec = ClosingWindowExecutor {
            clock: clock.clone(),
            inner: ScriptedExecutor::new(),
        };
        let mut options = fast();
        options.safety.maintenance_window =
            Some(MaintenanceWindow::new(time!(11:00), time!(12:00)));
        let result = execute_plan(&plan, &exec, &options, clock.as_ref())
            .await
            .unwrap();
        assert_eq!(result.executed_ids(), vec!["a"]);
        assert_eq!(result.skipped_ids(), vec!["b"]);
        assert_eq!(result.skipped[0].reason, SKIP_OUTSIDE_WINDOW);
    }

    #[tokio::test]
    async fn preflight_requires_confirmation_for_high_risk() {
        let deletes: Vec<ActionSpec> = (0..6)
            .map(|i| ActionSpec::new(format!("d{i}"), ActionType::Delete, "int-1", "webhooks", 5))
            .collect();
        let plan = plan_of(deletes);
        let exec = ScriptedExecutor::new();
        let clock = ManualClock::new(NOON);

        let mut options = fast();
        options.safety.allow_destructive = true;
        let err = execute_plan(&plan, &exec, &options, &clock)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PreflightError::ConfirmationRequired {
                risk: RiskLevel::High
            }
        );

        options.safety.confirmed = true;
        let result = execute_plan(&plan, &exec, &options, &clock).await.unwrap();
        assert_eq!(result.executed.len(), 6);
    }

    #[tokio::test]
    async fn destructive_grant_does_not_imply_confirmation() {
        let deletes: Vec<ActionSpec> = (0..6)
            .map(|i| ActionSpec::new(format!("d{i}"), ActionType::Delete, "int-1", "webhooks", 5))
            .collect();
        let plan = plan_of(deletes);
        assert!(plan.safety.requires_confirmation);
        let exec = ScriptedExecutor::new();
        let clock = ManualClock::new(NOON);

        let options: ExecutionOptions = serde_json::from_value(json!({
            "safety": {
                "require_confirmation": false,
                "confirmed": true,
                "allow_destructive": true
            }
        }))
        .unwrap();
        let err = execute_plan(&plan, &exec, &options, &clock)
            .await
            .unwrap_err();
        assert!(matches!(err, PreflightError::ConfirmationRequired { .. }));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn preflight_blocks_destructive_by_default() {
        let plan = plan_of(vec![ActionSpec::new(
            "d",
            ActionType::Delete,
            "int-1",
            "webhooks",
            5,
        )]);
        let exec = ScriptedExecutor::new();
        let clock = ManualClock::new(NOON);
        let err = execute_plan(&plan, &exec, &fast(), &clock)
            .await
            .unwrap_err();
        assert_eq!(err, PreflightError::DestructiveNotAllowed { count: 1 });
    }

    #[test]
    fn execution_options_from_config_shape() {
        let options: ExecutionOptions = serde_json::from_value(json!({
            "dry_run": true,
            "retries": { "max_attempts": 5 },
            "safety": {
                "allow_destructive": true,
                "maintenance_window": { "start": "01:00", "end": "05:00" }
            }
        }))
        .unwrap();
        assert!(options.dry_run);
        assert_eq!(options.retries.max_attempts, 5);
        assert_eq!(options.retries.backoff_multiplier, 2.0);
        assert!(!options.safety.confirmed);
        assert!(options.safety.maintenance_window.is_some());
    }
}
