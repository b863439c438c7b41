use std::time::Duration;

use remedy_interchange::ActionSpec;
use serde::{Deserialize, Serialize};

use super::{ActionError, ActionExecutor, ActionOutcome};

/// Exponential backoff between attempts of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based):
    /// `min(1000 * multiplier^(attempt - 1), max_delay)` milliseconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = 1000.0 * self.backoff_multiplier.powi(exp);
        Duration::from_millis(ms.min(self.max_delay_ms as f64).max(0.0) as u64)
    }
}

/// Fixed pause after every attempted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    pub actions_per_second: f64,
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit {
            actions_per_second: 10.0,
        }
    }
}

impl RateLimit {
    /// `1000 / actions_per_second` ms; zero when the limit is non-positive.
    pub fn interval(&self) -> Duration {
        if self.actions_per_second > 0.0 && self.actions_per_second.is_finite() {
            Duration::from_millis((1000.0 / self.actions_per_second).round() as u64)
        } else {
            Duration::ZERO
        }
    }

    pub async fn pause(&self) {
        let interval = self.interval();
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
}

/// Result of running one action through the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted {
    pub attempts: u32,
    pub result: Result<ActionOutcome, ActionError>,
}

/// Call the executor until it succeeds, returns a fatal error, or the policy
/// runs out of attempts. Actions not marked `retryable` get one attempt.
pub async fn execute_with_retry(
    executor: &dyn ActionExecutor,
    action: &ActionSpec,
    policy: &RetryPolicy,
) -> Attempted {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match executor.execute_action(action).await {
            Ok(outcome) => {
                return Attempted {
                    attempts: attempt,
                    result: Ok(outcome),
                }
            }
            Err(err) => {
                let give_up =
                    attempt >= max_attempts || !action.metadata.retryable || !err.is_retryable();
                if give_up {
                    return Attempted {
                        attempts: attempt,
                        result: Err(err),
                    };
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    action = %action.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "action failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
