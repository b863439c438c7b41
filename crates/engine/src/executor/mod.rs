//! Action execution.
//!
//! The [`ActionExecutor`] trait is the seam to the system being remediated.
//! [`retry::execute_with_retry`] wraps a single call in the retry policy and
//! is shared by [`plan::execute_plan`] and the job queue.

#[cfg(feature = "http")]
mod http;
pub mod plan;
pub mod retry;
mod scripted;

use async_trait::async_trait;
use remedy_interchange::ActionSpec;
use serde_json::Value;

#[cfg(feature = "http")]
pub use http::HttpExecutor;
pub use plan::{execute_plan, ExecutionOptions, PreflightError, SafetyOptions};
pub use retry::{execute_with_retry, Attempted, RateLimit, RetryPolicy};
pub use scripted::ScriptedExecutor;

/// What the downstream system reported for a successful action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub detail: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Transient: the call may succeed if repeated.
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Fatal(String),
}

impl ActionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Retryable(_))
    }
}

/// Applies one action to the downstream system.
///
/// Implementations should be idempotent per action: the retry loop and
/// at-least-once job execution may deliver the same action more than once.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute_action(&self, action: &ActionSpec) -> Result<ActionOutcome, ActionError>;
}
