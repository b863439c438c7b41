//! Runs the backend conformance suite against every bundled backend.

use remedy_storage::conformance::run_conformance_suite;
use remedy_storage::{JsonFileLedgerStore, MemoryLedgerStore};
use tempfile::TempDir;

#[tokio::test]
async fn memory_store_conformance() {
    let report = run_conformance_suite(|| async { MemoryLedgerStore::new() }).await;
    assert!(report.failed == 0, "{report}");
    assert!(report.total > 0);
}

#[tokio::test]
async fn json_file_store_conformance() {
    // Each factory call gets its own directory; keep them alive until the
    // suite finishes.
    let dirs = std::sync::Mutex::new(Vec::<TempDir>::new());
    let report = run_conformance_suite(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");
        dirs.lock().expect("dirs lock").push(dir);
        async move {
            JsonFileLedgerStore::open(path)
                .await
                .expect("open ledger file")
        }
    })
    .await;
    assert!(report.failed == 0, "{report}");
}
