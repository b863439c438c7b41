use std::future::Future;

use super::{ids, make_record, TestResult};
use crate::record::{ProcessingStatus, TimeRange};
use crate::LedgerStorage;

pub(super) async fn run_bulk_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "bulk",
            "import_into_empty_store",
            import_into_empty_store(factory).await,
        ),
        TestResult::from_result(
            "bulk",
            "import_upserts_existing_rows",
            import_upserts_existing_rows(factory).await,
        ),
        TestResult::from_result(
            "bulk",
            "export_then_import_reproduces_state",
            export_then_import_reproduces_state(factory).await,
        ),
    ]
}

async fn import_into_empty_store<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let records = vec![
        make_record("int-1", 0, ProcessingStatus::Detected),
        make_record("int-2", 1, ProcessingStatus::Failed),
    ];
    let written = s.import(records).await.map_err(|e| e.to_string())?;
    if written != 2 {
        return Err(format!("expected 2 written, got {}", written));
    }
    let rows = s.list(TimeRange::all()).await.map_err(|e| e.to_string())?;
    if ids(&rows) != ["int-1", "int-2"] {
        return Err(format!("unexpected rows {:?}", ids(&rows)));
    }
    Ok(())
}

/// Import replaces rows for the same entity and keeps unrelated rows.
async fn import_upserts_existing_rows<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.upsert(make_record("int-1", 0, ProcessingStatus::Detected))
        .await
        .map_err(|e| e.to_string())?;
    s.upsert(make_record("int-keep", 0, ProcessingStatus::Skipped))
        .await
        .map_err(|e| e.to_string())?;

    let replacement = make_record("int-1", 9, ProcessingStatus::Remediated);
    s.import(vec![replacement.clone()])
        .await
        .map_err(|e| e.to_string())?;

    let got = s
        .get("int-1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("int-1 missing after import")?;
    if got != replacement {
        return Err(format!("import did not overwrite: {:?}", got));
    }
    if s.get("int-keep").await.map_err(|e| e.to_string())?.is_none() {
        return Err("import removed an unrelated row".to_string());
    }
    Ok(())
}

async fn export_then_import_reproduces_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let source = factory().await;
    for (i, status) in ProcessingStatus::ALL.iter().enumerate() {
        source
            .upsert(make_record(&format!("int-{i}"), i as i64, *status))
            .await
            .map_err(|e| e.to_string())?;
    }
    let exported = source
        .list(TimeRange::all())
        .await
        .map_err(|e| e.to_string())?;

    let target = factory().await;
    target
        .import(exported.clone())
        .await
        .map_err(|e| e.to_string())?;
    let restored = target
        .list(TimeRange::all())
        .await
        .map_err(|e| e.to_string())?;
    if restored != exported {
        return Err("restored rows differ from exported rows".to_string());
    }
    Ok(())
}
