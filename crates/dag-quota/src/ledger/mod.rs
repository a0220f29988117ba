//! Usage ledger: confirmed usage plus in-flight reservations per user.

pub mod usage;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::map::{ConcurrentMap, ShardedMap};

pub use usage::Usage;

/// Username → [`Usage`], created lazily.
pub struct UsageLedger {
    users: Box<dyn ConcurrentMap<String, Usage>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::with_map(Box::new(ShardedMap::new()))
    }

    /// Use an alternative map backing.
    pub fn with_map(users: Box<dyn ConcurrentMap<String, Usage>>) -> Self {
        Self { users }
    }

    pub fn get(&self, username: &str) -> Option<Arc<Usage>> {
        self.users.get(&username.to_string())
    }

    /// Return the user's ledger, starting at zero if it does not exist yet.
    pub fn get_or_create(&self, username: &str) -> Arc<Usage> {
        self.users
            .get_or_insert_with(username.to_string(), &mut || Usage::new(0))
    }

    /// Seed a user's confirmed usage from a snapshot.
    pub fn restore(&self, username: &str, confirmed: i64) {
        self.users.insert(username.to_string(), Usage::new(confirmed));
    }

    /// Confirmed usage of every known user.
    pub fn confirmed_usages(&self) -> BTreeMap<String, i64> {
        self.users
            .entries()
            .into_iter()
            .map(|(name, usage)| (name, usage.confirmed()))
            .collect()
    }

    /// Confirmed plus pending usage of every known user.
    pub fn effective_usages(&self) -> BTreeMap<String, i64> {
        self.users
            .entries()
            .into_iter()
            .map(|(name, usage)| (name, usage.effective_usage()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new()
    }
}
