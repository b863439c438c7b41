use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::{ProcessedRecord, ProcessingStatus, TimeRange};

/// The storage trait for ledger backends.
///
/// A `LedgerStorage` holds exactly one [`ProcessedRecord`] per entity id.
///
/// ## Atomicity
///
/// `upsert` is last-write-wins and must be atomic: two concurrent upserts
/// for the same entity leave exactly one complete row, never a mix of the
/// two. `delete_older_than` must evaluate its predicate and delete under the
/// same lock (or transaction), so a row refreshed concurrently is never
/// removed on the strength of its old timestamp.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one store can be
/// shared by concurrently running jobs.
#[async_trait]
pub trait LedgerStorage: Send + Sync + 'static {
    /// Point lookup by entity id.
    async fn get(&self, entity_id: &str) -> Result<Option<ProcessedRecord>, StorageError>;

    /// Insert or overwrite the row for `record.entity_id`.
    async fn upsert(&self, record: ProcessedRecord) -> Result<(), StorageError>;

    /// All rows whose `last_processed_at` falls inside `range`, ordered by
    /// entity id.
    async fn list(&self, range: TimeRange) -> Result<Vec<ProcessedRecord>, StorageError>;

    /// Delete rows processed strictly before `cutoff` whose status is one of
    /// `statuses`. Returns the number of rows removed.
    async fn delete_older_than(
        &self,
        cutoff: OffsetDateTime,
        statuses: &[ProcessingStatus],
    ) -> Result<usize, StorageError>;

    /// Upsert every record. Returns the number of records written.
    async fn import(&self, records: Vec<ProcessedRecord>) -> Result<usize, StorageError> {
        let mut written = 0;
        for record in records {
            self.upsert(record).await?;
            written += 1;
        }
        Ok(written)
    }
}
