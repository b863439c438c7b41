use std::future::Future;

use super::{at_hours, ids, make_record, TestResult};
use crate::record::{ProcessingStatus, TimeRange};
use crate::LedgerStorage;

const REMOVABLE: [ProcessingStatus; 2] = [ProcessingStatus::Detected, ProcessingStatus::Remediated];

pub(super) async fn run_cleanup_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "cleanup",
            "deletes_only_listed_statuses",
            deletes_only_listed_statuses(factory).await,
        ),
        TestResult::from_result(
            "cleanup",
            "keeps_rows_at_or_after_cutoff",
            keeps_rows_at_or_after_cutoff(factory).await,
        ),
        TestResult::from_result(
            "cleanup",
            "empty_store_deletes_nothing",
            empty_store_deletes_nothing(factory).await,
        ),
    ]
}

/// Old Failed and Skipped rows survive a Detected/Remediated cleanup.
async fn deletes_only_listed_statuses<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rows = [
        ("int-detected", ProcessingStatus::Detected),
        ("int-remediated", ProcessingStatus::Remediated),
        ("int-failed", ProcessingStatus::Failed),
        ("int-skipped", ProcessingStatus::Skipped),
    ];
    for (id, status) in rows {
        s.upsert(make_record(id, 0, status))
            .await
            .map_err(|e| e.to_string())?;
    }

    let removed = s
        .delete_older_than(at_hours(100), &REMOVABLE)
        .await
        .map_err(|e| e.to_string())?;
    if removed != 2 {
        return Err(format!("expected 2 rows removed, got {}", removed));
    }

    let left = s.list(TimeRange::all()).await.map_err(|e| e.to_string())?;
    if ids(&left) != ["int-failed", "int-skipped"] {
        return Err(format!("unexpected survivors {:?}", ids(&left)));
    }
    Ok(())
}

/// The cutoff is strict: a row processed exactly at the cutoff stays.
async fn keeps_rows_at_or_after_cutoff<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (id, hours) in [("int-old", 0), ("int-edge", 10), ("int-new", 20)] {
        s.upsert(make_record(id, hours, ProcessingStatus::Remediated))
            .await
            .map_err(|e| e.to_string())?;
    }

    let removed = s
        .delete_older_than(at_hours(10), &REMOVABLE)
        .await
        .map_err(|e| e.to_string())?;
    if removed != 1 {
        return Err(format!("expected 1 row removed, got {}", removed));
    }
    if s.get("int-edge").await.map_err(|e| e.to_string())?.is_none() {
        return Err("row at the cutoff was deleted".to_string());
    }
    Ok(())
}

async fn empty_store_deletes_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let removed = s
        .delete_older_than(at_hours(1000), &REMOVABLE)
        .await
        .map_err(|e| e.to_string())?;
    if removed != 0 {
        return Err(format!("expected 0 rows removed, got {}", removed));
    }
    Ok(())
}
