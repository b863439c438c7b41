//! In-process ledger backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{ProcessedRecord, ProcessingStatus, TimeRange};
use crate::traits::LedgerStorage;

/// Ledger rows kept in a map guarded by a single async lock.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    rows: RwLock<BTreeMap<String, ProcessedRecord>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Remove matching rows from `rows`, returning them.
pub(crate) fn take_older_than(
    rows: &mut BTreeMap<String, ProcessedRecord>,
    cutoff: OffsetDateTime,
    statuses: &[ProcessingStatus],
) -> Vec<ProcessedRecord> {
    let doomed: Vec<String> = rows
        .values()
        .filter(|r| r.last_processed_at < cutoff && statuses.contains(&r.status))
        .map(|r| r.entity_id.clone())
        .collect();
    doomed.iter().filter_map(|id| rows.remove(id)).collect()
}

pub(crate) fn select(
    rows: &BTreeMap<String, ProcessedRecord>,
    range: TimeRange,
) -> Vec<ProcessedRecord> {
    rows.values()
        .filter(|r| range.contains(r.last_processed_at))
        .cloned()
        .collect()
}

#[async_trait]
impl LedgerStorage for MemoryLedgerStore {
    async fn get(&self, entity_id: &str) -> Result<Option<ProcessedRecord>, StorageError> {
        Ok(self.rows.read().await.get(entity_id).cloned())
    }

    async fn upsert(&self, record: ProcessedRecord) -> Result<(), StorageError> {
        self.rows
            .write()
            .await
            .insert(record.entity_id.clone(), record);
        Ok(())
    }

    async fn list(&self, range: TimeRange) -> Result<Vec<ProcessedRecord>, StorageError> {
        Ok(select(&*self.rows.read().await, range))
    }

    async fn delete_older_than(
        &self,
        cutoff: OffsetDateTime,
        statuses: &[ProcessingStatus],
    ) -> Result<usize, StorageError> {
        let mut rows = self.rows.write().await;
        Ok(take_older_than(&mut rows, cutoff, statuses).len())
    }

    async fn import(&self, records: Vec<ProcessedRecord>) -> Result<usize, StorageError> {
        let mut rows = self.rows.write().await;
        let written = records.len();
        for record in records {
            rows.insert(record.entity_id.clone(), record);
        }
        Ok(written)
    }
}
