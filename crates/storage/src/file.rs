//! JSON-file ledger backend.
//!
//! The whole ledger lives in memory and is rewritten to disk on every
//! mutation while the write lock is held. Writes go to a sibling temp file
//! that is then renamed over the target, so a crash mid-write leaves the
//! previous ledger intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::memory::{select, take_older_than};
use crate::record::{ProcessedRecord, ProcessingStatus, TimeRange};
use crate::traits::LedgerStorage;

/// On-disk document format.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    records: Vec<ProcessedRecord>,
}

const FILE_VERSION: u32 = 1;

#[derive(Debug)]
pub struct JsonFileLedgerStore {
    path: PathBuf,
    rows: RwLock<BTreeMap<String, ProcessedRecord>>,
}

impl JsonFileLedgerStore {
    /// Open the ledger at `path`. A missing file is an empty ledger; it is
    /// created on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let rows = match tokio::fs::read(&path).await {
            Ok(bytes) => parse(&path, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_err(&path, e)),
        };
        tracing::debug!(path = %path.display(), rows = rows.len(), "opened ledger file");
        Ok(JsonFileLedgerStore {
            path,
            rows: RwLock::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, rows: &BTreeMap<String, ProcessedRecord>) -> Result<(), StorageError> {
        let doc = LedgerFile {
            version: FILE_VERSION,
            records: rows.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| StorageError::Backend(format!("serialize ledger: {}", e)))?;

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_err(&self.path, e))
    }
}

fn parse(path: &Path, bytes: &[u8]) -> Result<BTreeMap<String, ProcessedRecord>, StorageError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    let doc: LedgerFile = serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupt {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    if doc.version != FILE_VERSION {
        return Err(StorageError::Corrupt {
            path: path.display().to_string(),
            message: format!("unsupported ledger version {}", doc.version),
        });
    }
    Ok(doc
        .records
        .into_iter()
        .map(|r| (r.entity_id.clone(), r))
        .collect())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl LedgerStorage for JsonFileLedgerStore {
    async fn get(&self, entity_id: &str) -> Result<Option<ProcessedRecord>, StorageError> {
        Ok(self.rows.read().await.get(entity_id).cloned())
    }

    async fn upsert(&self, record: ProcessedRecord) -> Result<(), StorageError> {
        let mut rows = self.rows.write().await;
        let key = record.entity_id.clone();
        let previous = rows.insert(key.clone(), record);
        if let Err(e) = self.persist(&rows).await {
            // Keep memory consistent with disk.
            match previous {
                Some(prev) => rows.insert(key, prev),
                None => rows.remove(&key),
            };
            return Err(e);
        }
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
        let removed = take_older_than(&mut rows, cutoff, statuses);
        if removed.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.persist(&rows).await {
            for record in removed {
                rows.insert(record.entity_id.clone(), record);
            }
            return Err(e);
        }
        Ok(removed.len())
    }

    async fn import(&self, records: Vec<ProcessedRecord>) -> Result<usize, StorageError> {
        let mut rows = self.rows.write().await;
        let before = rows.clone();
        let written = records.len();
        for record in records {
            rows.insert(record.entity_id.clone(), record);
        }
        if let Err(e) = self.persist(&rows).await {
            *rows = before;
            return Err(e);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(entity_id: &str) -> ProcessedRecord {
        ProcessedRecord {
            entity_id: entity_id.to_string(),
            last_processed_at: datetime!(2026-01-01 00:00 UTC),
            last_issue_signature: "issue-sig".to_string(),
            last_action_signature: "action-sig".to_string(),
            status: ProcessingStatus::Remediated,
            operator_id: "op".to_string(),
            session_id: "s1".to_string(),
            issue_count: 2,
            action_count: 3,
        }
    }

    #[tokio::test]
    async fn rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let store = JsonFileLedgerStore::open(&path).await.unwrap();
        store.upsert(record("int-1")).await.unwrap();
        store.upsert(record("int-2")).await.unwrap();
        drop(store);

        let reopened = JsonFileLedgerStore::open(&path).await.unwrap();
        let row = reopened.get("int-1").await.unwrap().unwrap();
        assert_eq!(row, record("int-1"));
        assert_eq!(reopened.list(TimeRange::all()).await.unwrap().len(), 2);
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn missing_file_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileLedgerStore::open(dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(store.get("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = JsonFileLedgerStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }), "got {err}");
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("ledger.json");
        let store = JsonFileLedgerStore::open(&path).await.unwrap();

        let err = store.upsert(record("int-1")).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }), "got {err}");
        assert!(store.get("int-1").await.unwrap().is_none());
    }
}
