use std::future::Future;

use super::{make_record, TestResult};
use crate::record::ProcessingStatus;
use crate::LedgerStorage;

pub(super) async fn run_upsert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "upsert",
            "get_missing_returns_none",
            get_missing_returns_none(factory).await,
        ),
        TestResult::from_result(
            "upsert",
            "upsert_then_get_returns_row",
            upsert_then_get_returns_row(factory).await,
        ),
        TestResult::from_result(
            "upsert",
            "upsert_overwrites_existing_row",
            upsert_overwrites_existing_row(factory).await,
        ),
        TestResult::from_result(
            "upsert",
            "entities_are_independent",
            entities_are_independent(factory).await,
        ),
    ]
}

/// An empty store has no row for any entity.
async fn get_missing_returns_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get("int-1").await.map_err(|e| e.to_string())? {
        None => Ok(()),
        Some(r) => Err(format!("expected no row, got {:?}", r)),
    }
}

/// Every field written by `upsert` is read back unchanged.
async fn upsert_then_get_returns_row<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rec = make_record("int-1", 0, ProcessingStatus::Detected);
    s.upsert(rec.clone()).await.map_err(|e| e.to_string())?;

    let got = s
        .get("int-1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("row missing after upsert")?;
    if got != rec {
        return Err(format!("expected {:?}, got {:?}", rec, got));
    }
    Ok(())
}

/// A second upsert for the same entity replaces the row; no history is kept.
async fn upsert_overwrites_existing_row<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.upsert(make_record("int-1", 0, ProcessingStatus::Detected))
        .await
        .map_err(|e| e.to_string())?;

    let mut second = make_record("int-1", 5, ProcessingStatus::Remediated);
    second.last_issue_signature = "changed".to_string();
    s.upsert(second.clone()).await.map_err(|e| e.to_string())?;

    let got = s
        .get("int-1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("row missing after overwrite")?;
    if got != second {
        return Err(format!("expected overwritten row {:?}, got {:?}", second, got));
    }

    let all = s
        .list(crate::TimeRange::all())
        .await
        .map_err(|e| e.to_string())?;
    if all.len() != 1 {
        return Err(format!("expected exactly 1 row, got {}", all.len()));
    }
    Ok(())
}

/// Writing one entity leaves another untouched.
async fn entities_are_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = make_record("int-a", 0, ProcessingStatus::Failed);
    s.upsert(a.clone()).await.map_err(|e| e.to_string())?;
    s.upsert(make_record("int-b", 1, ProcessingStatus::Remediated))
        .await
        .map_err(|e| e.to_string())?;

    let got = s
        .get("int-a")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("int-a missing")?;
    if got != a {
        return Err(format!("int-a changed: {:?}", got));
    }
    Ok(())
}
