//! Quota lookup.

use std::collections::BTreeMap;

use crate::config::QuotaConfig;

/// Returns the current quota of a user in bytes.
pub trait QuotaPolicy: Send + Sync {
    fn quota(&self, username: &str) -> i64;
}

impl<F> QuotaPolicy for F
where
    F: Fn(&str) -> i64 + Send + Sync,
{
    fn quota(&self, username: &str) -> i64 {
        self(username)
    }
}

/// Quotas taken from a [`QuotaConfig`]: a default plus per-user overrides.
#[derive(Debug, Clone)]
pub struct ConfiguredQuota {
    default_quota: i64,
    overrides: BTreeMap<String, i64>,
}

impl ConfiguredQuota {
    pub fn from_config(config: &QuotaConfig) -> Self {
        Self {
            default_quota: config.default_quota,
            overrides: config.user_quotas.clone(),
        }
    }
}

impl QuotaPolicy for ConfiguredQuota {
    fn quota(&self, username: &str) -> i64 {
        self.overrides
            .get(username)
            .copied()
            .unwrap_or(self.default_quota)
    }
}
