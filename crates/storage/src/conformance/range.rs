use std::future::Future;

use super::{at_hours, ids, make_record, TestResult};
use crate::record::{ProcessingStatus, TimeRange};
use crate::LedgerStorage;

pub(super) async fn run_range_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "range",
            "unbounded_range_returns_all_sorted",
            unbounded_range_returns_all_sorted(factory).await,
        ),
        TestResult::from_result(
            "range",
            "range_is_half_open",
            range_is_half_open(factory).await,
        ),
        TestResult::from_result(
            "range",
            "open_ended_ranges",
            open_ended_ranges(factory).await,
        ),
    ]
}

async fn seed<S: LedgerStorage>(s: &S) -> Result<(), String> {
    for (id, hours) in [("int-c", 0), ("int-a", 10), ("int-b", 20)] {
        s.upsert(make_record(id, hours, ProcessingStatus::Remediated))
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

async fn unbounded_range_returns_all_sorted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s).await?;
    let rows = s.list(TimeRange::all()).await.map_err(|e| e.to_string())?;
    let got = ids(&rows);
    if got != ["int-a", "int-b", "int-c"] {
        return Err(format!("expected rows sorted by entity id, got {:?}", got));
    }
    Ok(())
}

/// `from` is inclusive, `to` exclusive.
async fn range_is_half_open<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s).await?;
    let rows = s
        .list(TimeRange::between(at_hours(10), at_hours(20)))
        .await
        .map_err(|e| e.to_string())?;
    let got = ids(&rows);
    if got != ["int-a"] {
        return Err(format!("expected [int-a] in [10h, 20h), got {:?}", got));
    }
    Ok(())
}

async fn open_ended_ranges<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s).await?;

    let since = s
        .list(TimeRange {
            from: Some(at_hours(10)),
            to: None,
        })
        .await
        .map_err(|e| e.to_string())?;
    if ids(&since) != ["int-a", "int-b"] {
        return Err(format!("from 10h: got {:?}", ids(&since)));
    }

    let until = s
        .list(TimeRange {
            from: None,
            to: Some(at_hours(10)),
        })
        .await
        .map_err(|e| e.to_string())?;
    if ids(&until) != ["int-c"] {
        return Err(format!("until 10h: got {:?}", ids(&until)));
    }
    Ok(())
}
