//! Engine configuration.
//!
//! Every field has a default, so an empty TOML file is a valid config:
//!
//! ```toml
//! snapshot_path = "/var/lib/dag-quota/usage.json"
//! default_quota = 1073741824
//! max_concurrent_events = 64
//! shutdown_timeout_ms = 5000
//! snapshot_interval_secs = 300
//!
//! [user_quotas]
//! alice = 10737418240
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, Result};

const DEFAULT_QUOTA: i64 = 1024 * 1024 * 1024; // 1 GiB

/// Configuration of a [`QuotaFilter`](crate::filter::QuotaFilter).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Where the usage snapshot is read at startup and written at shutdown.
    pub snapshot_path: PathBuf,
    /// Quota in bytes for users without an override.
    pub default_quota: i64,
    /// Per-user quota overrides in bytes.
    pub user_quotas: BTreeMap<String, i64>,
    /// Upper bound on events processed at the same time.
    pub max_concurrent_events: usize,
    /// How long shutdown waits for in-flight events before writing the snapshot.
    pub shutdown_timeout_ms: u64,
    /// Period of best-effort snapshot writes; `None` writes only at shutdown.
    pub snapshot_interval_secs: Option<u64>,
    /// Remove the snapshot file once loaded so a crash cannot resurrect it.
    pub consume_snapshot_on_load: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("usage-snapshot.json"),
            default_quota: DEFAULT_QUOTA,
            user_quotas: BTreeMap::new(),
            max_concurrent_events: 64,
            shutdown_timeout_ms: 5000,
            snapshot_interval_secs: None,
            consume_snapshot_on_load: true,
        }
    }
}

impl QuotaConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| QuotaError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_events == 0 {
            return Err(QuotaError::InvalidConfig(
                "max_concurrent_events must be > 0".into(),
            ));
        }
        if self.default_quota < 0 {
            return Err(QuotaError::InvalidConfig(
                "default_quota must not be negative".into(),
            ));
        }
        if let Some((user, _)) = self.user_quotas.iter().find(|(_, q)| **q < 0) {
            return Err(QuotaError::InvalidConfig(format!(
                "quota for {user} must not be negative"
            )));
        }
        if self.snapshot_interval_secs == Some(0) {
            return Err(QuotaError::InvalidConfig(
                "snapshot_interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Quota of `username` in bytes.
    pub fn quota_for(&self, username: &str) -> i64 {
        self.user_quotas
            .get(username)
            .copied()
            .unwrap_or(self.default_quota)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn snapshot_interval(&self) -> Option<Duration> {
        self.snapshot_interval_secs.map(Duration::from_secs)
    }
}
