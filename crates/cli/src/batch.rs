//! Loading action batches and the shared pieces the commands build from
//! config: the ledger and the action executor.

use std::path::Path;
use std::sync::Arc;

use remedy_engine::{ActionExecutor, Ledger, ScriptedExecutor};
use remedy_interchange::ActionBatch;
use remedy_storage::JsonFileLedgerStore;

use crate::config::RemedyConfig;

/// Read and parse an action batch JSON file.
pub(crate) fn read_batch(path: &Path) -> Result<ActionBatch, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("error parsing batch '{}': {}", path.display(), e))
}

/// Open the JSON-file ledger named in `[ledger]`, creating its directory.
pub(crate) async fn open_ledger(config: &RemedyConfig) -> Result<Ledger, String> {
    let path = &config.ledger.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create ledger directory '{}': {}", parent.display(), e))?;
    }
    let store = JsonFileLedgerStore::open(path.clone())
        .await
        .map_err(|e| e.to_string())?;
    Ok(Ledger::new(Arc::new(store)))
}

/// An age given in hours on the command line or in `[ledger]`.
pub(crate) fn hours(h: i64) -> Result<time::Duration, String> {
    h.checked_mul(3600)
        .map(time::Duration::seconds)
        .ok_or_else(|| format!("{} hours is out of range", h))
}

/// The executor real runs go through.
///
/// Dry runs never call the executor, so they get an inert one and need no
/// API configuration.
pub(crate) fn build_executor(
    config: &RemedyConfig,
    dry_run: bool,
) -> Result<Arc<dyn ActionExecutor>, String> {
    if dry_run {
        return Ok(Arc::new(ScriptedExecutor::new()));
    }
    let base_url = config.api.resolved_base_url().ok_or_else(|| {
        format!(
            "no API base URL: set [api] base_url or {}, or use --dry-run",
            remedy_engine::queue::API_BASE_VAR
        )
    })?;
    Ok(Arc::new(remedy_engine::HttpExecutor::new(
        &base_url,
        config.api.token(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_batch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"{
                "entityId": "int-1",
                "issues": [{"ruleId": "r1", "severity": "error", "message": "m"}],
                "actions": [{
                    "id": "a1",
                    "type": "Patch",
                    "target": {"entityId": "int-1", "resourceType": "integration"},
                    "metadata": {"reason": "fix", "priority": 5}
                }]
            }"#,
        )
        .unwrap();
        let batch = read_batch(&path).unwrap();
        assert_eq!(batch.entity_id, "int-1");
        assert_eq!(batch.actions[0].id, "a1");
        assert!(!batch.actions[0].metadata.retryable);
    }

    #[test]
    fn bad_batch_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();
        let err = read_batch(&path).unwrap_err();
        assert!(err.contains("broken.json"));
    }

    #[test]
    fn real_runs_need_an_api_base() {
        // A blank base_url wins over REMEDY_API_BASE and counts as unset.
        let mut config = RemedyConfig::default();
        config.api.base_url = Some("  ".into());
        let err = build_executor(&config, false).err().unwrap();
        assert!(err.contains("no API base URL"), "got {err}");
        assert!(build_executor(&config, true).is_ok());

        config.api.base_url = Some("http://127.0.0.1:9".into());
        assert!(build_executor(&config, false).is_ok());
    }

    #[test]
    fn hours_out_of_range_is_an_error() {
        assert_eq!(hours(24).unwrap(), time::Duration::days(1));
        assert!(hours(i64::MAX).unwrap_err().contains("out of range"));
    }
}
