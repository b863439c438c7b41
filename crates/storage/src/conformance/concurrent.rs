use std::future::Future;
use std::sync::Arc;

use super::{make_record, TestResult};
use crate::record::{ProcessingStatus, TimeRange};
use crate::{LedgerStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "racing_upserts_leave_one_complete_row",
            racing_upserts_leave_one_complete_row(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_upserts_different_entities_all_land",
            concurrent_upserts_different_entities_all_land(factory).await,
        ),
    ]
}

// ── Racing writers on one key ───────────────────────────────────────────────

/// N tasks upsert the same entity with distinct payloads. Afterwards there is
/// exactly one row and it equals one of the written records in full: no
/// field from one writer mixed with another's.
async fn racing_upserts_leave_one_complete_row<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let written: Vec<_> = (0..N)
        .map(|i| {
            let mut rec = make_record("int-shared", i as i64, ProcessingStatus::Remediated);
            rec.last_issue_signature = format!("sig-{i}");
            rec.session_id = format!("session-{i}");
            rec.action_count = i;
            rec
        })
        .collect();

    let mut handles = Vec::new();
    for rec in written.clone() {
        let s = storage.clone();
        handles.push(tokio::spawn(async move { s.upsert(rec).await }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let rows = storage
        .list(TimeRange::all())
        .await
        .map_err(|e| e.to_string())?;
    if rows.len() != 1 {
        return Err(format!("expected exactly 1 row, got {}", rows.len()));
    }
    if !written.contains(&rows[0]) {
        return Err(format!("final row is a torn write: {:?}", rows[0]));
    }
    Ok(())
}

// ── Writers on distinct keys ────────────────────────────────────────────────

async fn concurrent_upserts_different_entities_all_land<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.upsert(make_record(
                &format!("int-{i}"),
                i as i64,
                ProcessingStatus::Detected,
            ))
            .await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let rows = storage
        .list(TimeRange::all())
        .await
        .map_err(|e| e.to_string())?;
    if rows.len() != N {
        return Err(format!("expected {} rows, got {}", N, rows.len()));
    }
    Ok(())
}
