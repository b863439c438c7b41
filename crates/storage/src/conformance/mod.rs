//! Conformance test suite for `LedgerStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `LedgerStorage` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Upsert**: point lookup, overwrite, one row per entity
//! - **Range**: `last_processed_at` range queries
//! - **Cleanup**: age and status filtered deletion
//! - **Bulk**: import as upsert, export of every row
//! - **Concurrent**: racing writers on one key and on many keys
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use remedy_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryLedgerStore::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod bulk;
mod cleanup;
mod concurrent;
mod range;
mod upsert;

use std::fmt;
use std::future::Future;

use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use crate::record::{ProcessedRecord, ProcessingStatus};
use crate::LedgerStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "upsert", "cleanup").
    pub category: String,
    /// Test name (e.g. "upsert_overwrites_existing_row").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(upsert::run_upsert_tests(&factory).await);
    results.extend(range::run_range_tests(&factory).await);
    results.extend(cleanup::run_cleanup_tests(&factory).await);
    results.extend(bulk::run_bulk_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Fixed reference instant so tests never depend on the wall clock.
const BASE: OffsetDateTime = datetime!(2026-01-01 00:00 UTC);

fn at_hours(hours: i64) -> OffsetDateTime {
    BASE + Duration::hours(hours)
}

fn make_record(entity_id: &str, hours: i64, status: ProcessingStatus) -> ProcessedRecord {
    ProcessedRecord {
        entity_id: entity_id.to_string(),
        last_processed_at: at_hours(hours),
        last_issue_signature: format!("issues-{entity_id}"),
        last_action_signature: format!("actions-{entity_id}"),
        status,
        operator_id: "conformance".to_string(),
        session_id: "session-1".to_string(),
        issue_count: 1,
        action_count: 1,
    }
}

fn ids(records: &[ProcessedRecord]) -> Vec<&str> {
    records.iter().map(|r| r.entity_id.as_str()).collect()
}
