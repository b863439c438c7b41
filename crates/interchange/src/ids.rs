//! Identifier generation.
//!
//! Planners and queue services each own a generator, so independent
//! instances never share counter state.

use std::sync::atomic::{AtomicU64, Ordering};

/// Produces unique identifiers with a caller-chosen prefix.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, prefix: &str) -> String;
}

/// Random v4 UUIDs, e.g. `job-3f2c...`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, uuid::Uuid::new_v4())
    }
}

/// Monotonic counter scoped to one instance: `plan-1`, `plan-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", prefix, n)
    }
}
