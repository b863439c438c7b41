//! remedy-engine: the remediation pipeline.
//!
//! - [`planner`] turns proposed actions into an ordered, risk-scored
//!   [`ExecutionPlan`](remedy_interchange::ExecutionPlan) with a rollback plan
//! - [`executor`] runs plans against an [`ActionExecutor`] with retries,
//!   rate limiting, maintenance windows and abort-on-fatal
//! - [`queue`] runs many entities' action sets as jobs under bounded
//!   concurrency
//! - [`ledger`] remembers what was processed so unchanged entities are
//!   skipped on the next run

pub mod clock;
pub mod executor;
pub mod ledger;
pub mod planner;
pub mod queue;
pub mod route;
pub mod signature;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
#[cfg(feature = "http")]
pub use executor::HttpExecutor;
pub use executor::{
    execute_plan, ActionError, ActionExecutor, ActionOutcome, ExecutionOptions, PreflightError,
    RateLimit, RetryPolicy, SafetyOptions, ScriptedExecutor,
};
pub use ledger::{Ledger, LedgerError, LedgerSnapshot, ProcessingContext, ProcessingStats};
pub use planner::{PlanError, PlanOptions, Planner};
pub use queue::{
    ExecutionStats, ExportError, ExportFormat, JobQueueService, JobRequest, QueueError,
    QueueOptions, QueueSnapshot,
};
pub use signature::{action_signature, issue_signature};
pub use window::MaintenanceWindow;
