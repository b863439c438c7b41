//! remedy-interchange: shared data model for the remediation pipeline.
//!
//! Provides the serde types exchanged between the rule evaluator, the
//! planner, the executors, the job queue and the ledger: actions, plans,
//! execution results, jobs and issues. All types serialize as camelCase
//! JSON with RFC 3339 timestamps.

pub mod action;
pub mod ids;
pub mod issue;
pub mod job;
pub mod plan;
pub mod result;

pub use action::{
    ActionMetadata, ActionPayload, ActionSpec, ActionTarget, ActionType, FATAL_PRIORITY,
    HIGH_PRIORITY, ROLLBACK_PRIORITY,
};
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use issue::{ActionBatch, Issue};
pub use job::{Job, JobFailure, JobReport, JobStatus};
pub use plan::{ExecutionPlan, PlanSafety, PlanSummary, RiskLevel};
pub use result::{
    ExecutedAction, ExecutionResult, ExecutionStatus, FailedAction, RollbackInfo, SkippedAction,
    SKIP_FATAL_ABORT, SKIP_OPS_LIMIT, SKIP_OUTSIDE_WINDOW,
};
