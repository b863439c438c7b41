use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use remedy_interchange::ActionSpec;
use serde_json::json;

use super::{ActionError, ActionExecutor, ActionOutcome};

enum Script {
    FailTimes { remaining: u32, error: ActionError },
    Always(ActionError),
}

/// Deterministic executor for tests and rehearsals.
///
/// Every action succeeds unless scripted otherwise. Calls are logged in
/// order, and the peak number of overlapping calls is tracked.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` calls for `action_id`, then succeed.
    pub fn fail_times(self, action_id: &str, times: u32, error: ActionError) -> Self {
        lock(&self.scripts).insert(
            action_id.to_string(),
            Script::FailTimes {
                remaining: times,
                error,
            },
        );
        self
    }

    pub fn always_fail(self, action_id: &str, error: ActionError) -> Self {
        lock(&self.scripts).insert(action_id.to_string(), Script::Always(error));
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Action ids in call order, one entry per attempt.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_result(&self, action_id: &str) -> Result<(), ActionError> {
        let mut scripts = lock(&self.scripts);
        match scripts.get_mut(action_id) {
            Some(Script::Always(error)) => Err(error.clone()),
            Some(Script::FailTimes { remaining, error }) if *remaining > 0 => {
                *remaining -= 1;
                Err(error.clone())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn execute_action(&self, action: &ActionSpec) -> Result<ActionOutcome, ActionError> {
        lock(&self.calls).push(action.id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.next_result(&action.id);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        result.map(|()| ActionOutcome {
            detail: Some(json!({ "scripted": true, "action": action.id })),
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
