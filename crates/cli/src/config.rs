//! `remedy.toml` configuration.
//!
//! Every field has a default, so an empty or missing file is valid.
//!
//! # Example
//!
//! ```toml
//! [execution]
//! dry_run = false
//! max_ops_per_integration = 25
//!
//! [execution.rate_limit]
//! actions_per_second = 5.0
//!
//! [execution.retries]
//! max_attempts = 4
//! backoff_multiplier = 2.0
//! max_delay_ms = 20000
//!
//! [execution.safety]
//! allow_destructive = false
//!
//! [execution.safety.maintenance_window]
//! start = "22:00"
//! end = "04:00"
//! days = ["sat", "sun"]
//!
//! [planner]
//! max_actions = 100
//! max_retries = 3
//!
//! [queue]
//! max_concurrent = 4
//! recent_completions = 20
//!
//! [ledger]
//! path = ".remedy/ledger.json"
//! max_age_hours = 24
//!
//! [api]
//! base_url = "https://integrations.example.com/api"
//! token_env = "REMEDY_API_TOKEN"
//! ```

use std::path::{Path, PathBuf};

use remedy_engine::{ExecutionOptions, PlanOptions, QueueOptions};
use serde::{Deserialize, Serialize};

/// Used when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "remedy.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    pub execution: ExecutionOptions,
    pub planner: PlanOptions,
    pub queue: QueueOptions,
    pub ledger: LedgerConfig,
    pub api: ApiConfig,
}

/// `[ledger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON file backing the ledger.
    pub path: PathBuf,
    /// An entity processed more recently than this with unchanged issues is
    /// skipped.
    pub max_age_hours: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            path: PathBuf::from(".remedy/ledger.json"),
            max_age_hours: 24,
        }
    }
}

/// `[api]` section: where real (non-dry-run) actions are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Falls back to the `REMEDY_API_BASE` environment variable.
    pub base_url: Option<String>,
    /// Environment variable holding the bearer token.
    pub token_env: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: None,
            token_env: "REMEDY_API_TOKEN".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn resolved_base_url(&self) -> Option<String> {
        self.base_url
            .clone()
            .or_else(|| std::env::var(remedy_engine::queue::API_BASE_VAR).ok())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok()
    }
}

/// Load the config from `path`, or from [`DEFAULT_CONFIG_FILE`] when no path
/// is given. An explicitly named file must exist.
pub fn load_config(path: Option<&Path>) -> Result<RemedyConfig, String> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    if !path.exists() {
        if required {
            return Err(format!("config file '{}' not found", path.display()));
        }
        return Ok(RemedyConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;
    parse_config(&content).map_err(|e| format!("invalid config '{}': {}", path.display(), e))
}

pub fn parse_config(content: &str) -> Result<RemedyConfig, String> {
    toml::from_str(content).map_err(|e| e.to_string())
}
