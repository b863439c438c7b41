//! Idempotence ledger.
//!
//! [`Ledger`] sits on top of any [`LedgerStorage`] backend and answers the
//! question "has this entity already been handled for exactly these
//! issues, recently enough?". It also records outcomes and offers the
//! maintenance operations: stats, staleness, cleanup and export/import.

use std::collections::BTreeMap;
use std::sync::Arc;

use remedy_interchange::{ActionSpec, Issue};
use remedy_storage::{LedgerStorage, ProcessedRecord, ProcessingStatus, StorageError, TimeRange};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::clock::{Clock, SystemClock};
use crate::signature::{action_signature, issue_signature};

/// Snapshot format version written by [`Ledger::export_state`].
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("unsupported ledger snapshot version {0} (expected {expected})", expected = SNAPSHOT_VERSION)]
    UnsupportedSnapshot(u32),
}

/// Portable dump of every ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub exported_at: OffsetDateTime,
    pub records: Vec<ProcessedRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub total: usize,
    pub by_status: BTreeMap<ProcessingStatus, usize>,
    pub total_issues: usize,
    pub total_actions: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub oldest: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub newest: Option<OffsetDateTime>,
}

/// Who processed an entity, for the ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingContext {
    pub operator_id: String,
    pub session_id: String,
}

pub struct Ledger {
    store: Arc<dyn LedgerStorage>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStorage>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn LedgerStorage>, clock: Arc<dyn Clock>) -> Self {
        Ledger { store, clock }
    }

    /// True iff a row exists for `entity_id`, it is younger than `max_age`
    /// and it carries `issue_signature`.
    ///
    /// A storage failure answers `false`, so the entity is processed again
    /// rather than silently skipped.
    pub async fn is_already_processed(
        &self,
        entity_id: &str,
        issue_signature: &str,
        max_age: Duration,
    ) -> bool {
        let record = match self.store.get(entity_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(err) => {
                tracing::warn!(
                    entity_id,
                    error = %err,
                    "ledger lookup failed, treating entity as unprocessed"
                );
                return false;
            }
        };
        let age = self.clock.now() - record.last_processed_at;
        age < max_age && record.last_issue_signature == issue_signature
    }

    /// Compute signatures and overwrite the entity's row.
    pub async fn record_processing(
        &self,
        entity_id: &str,
        issues: &[Issue],
        actions: &[ActionSpec],
        context: &ProcessingContext,
        status: ProcessingStatus,
    ) -> Result<ProcessedRecord, LedgerError> {
        let record = ProcessedRecord {
            entity_id: entity_id.to_string(),
            last_processed_at: self.clock.now(),
            last_issue_signature: issue_signature(issues),
            last_action_signature: action_signature(actions),
            status,
            operator_id: context.operator_id.clone(),
            session_id: context.session_id.clone(),
            issue_count: issues.len(),
            action_count: actions.len(),
        };
        self.store.upsert(record.clone()).await?;
        tracing::info!(
            entity_id,
            %status,
            issues = issues.len(),
            actions = actions.len(),
            "ledger updated"
        );
        Ok(record)
    }

    pub async fn get(&self, entity_id: &str) -> Result<Option<ProcessedRecord>, LedgerError> {
        Ok(self.store.get(entity_id).await?)
    }

    pub async fn processing_stats(
        &self,
        range: Option<TimeRange>,
    ) -> Result<ProcessingStats, LedgerError> {
        let rows = self.store.list(range.unwrap_or_default()).await?;
        let mut stats = ProcessingStats::default();
        for row in &rows {
            stats.total += 1;
            *stats.by_status.entry(row.status).or_insert(0) += 1;
            stats.total_issues += row.issue_count;
            stats.total_actions += row.action_count;
            let at = row.last_processed_at;
            stats.oldest = Some(stats.oldest.map_or(at, |o| o.min(at)));
            stats.newest = Some(stats.newest.map_or(at, |n| n.max(at)));
        }
        Ok(stats)
    }

    /// Rows not processed within `max_age`, plus every `Failed` row.
    pub async fn stale_integrations(
        &self,
        max_age: Duration,
    ) -> Result<Vec<ProcessedRecord>, LedgerError> {
        let cutoff = self.cutoff(max_age);
        let rows = self.store.list(TimeRange::all()).await?;
        Ok(rows
            .into_iter()
            .filter(|r| r.last_processed_at < cutoff || r.status == ProcessingStatus::Failed)
            .collect())
    }

    /// Delete `Detected` and `Remediated` rows older than `older_than`.
    /// `Failed` and `Skipped` rows are kept regardless of age.
    pub async fn cleanup(&self, older_than: Duration) -> Result<usize, LedgerError> {
        let cutoff = self.cutoff(older_than);
        let removed = self
            .store
            .delete_older_than(
                cutoff,
                &[ProcessingStatus::Detected, ProcessingStatus::Remediated],
            )
            .await?;
        tracing::info!(removed, %cutoff, "ledger cleanup");
        Ok(removed)
    }

    /// `now - age`, saturating at the earliest representable instant.
    fn cutoff(&self, age: Duration) -> OffsetDateTime {
        self.clock
            .now()
            .checked_sub(age)
            .unwrap_or_else(|| PrimitiveDateTime::MIN.assume_utc())
    }

    pub async fn export_state(&self) -> Result<LedgerSnapshot, LedgerError> {
        Ok(LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            exported_at: self.clock.now(),
            records: self.store.list(TimeRange::all()).await?,
        })
    }

    /// Upsert every record of the snapshot. Returns the number written.
    pub async fn import_state(&self, snapshot: LedgerSnapshot) -> Result<usize, LedgerError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LedgerError::UnsupportedSnapshot(snapshot.version));
        }
        Ok(self.store.import(snapshot.records).await?)
    }
}
