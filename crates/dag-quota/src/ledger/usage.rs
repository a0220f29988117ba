//! Per-user usage with optimistic reservations.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{QuotaError, Result};
use crate::identity::WriterIdentity;

#[derive(Debug, Default)]
struct UsageState {
    confirmed: i64,
    pending: HashMap<WriterIdentity, i64>,
}

impl UsageState {
    fn effective(&self) -> i64 {
        self.confirmed + self.pending.values().sum::<i64>()
    }
}

/// Confirmed bytes for one user plus at most one pending delta per writer.
///
/// All operations take the same lock, so a check followed by a reservation
/// in [`Usage::try_reserve`] observes a consistent total.
#[derive(Debug, Default)]
pub struct Usage {
    state: Mutex<UsageState>,
}

impl Usage {
    pub fn new(confirmed: i64) -> Self {
        Self {
            state: Mutex::new(UsageState {
                confirmed,
                pending: HashMap::new(),
            }),
        }
    }

    /// Add `delta` to the writer's pending reservation.
    pub fn reserve(&self, writer: &WriterIdentity, delta: i64) {
        *self.state.lock().pending.entry(writer.clone()).or_insert(0) += delta;
    }

    /// Replace the writer's pending estimate with the computed `delta`.
    pub fn confirm(&self, writer: &WriterIdentity, delta: i64) {
        let mut state = self.state.lock();
        state.pending.remove(writer);
        state.confirmed += delta;
    }

    /// Drop the writer's reservation. Returns the released amount.
    pub fn cancel(&self, writer: &WriterIdentity) -> i64 {
        self.state.lock().pending.remove(writer).unwrap_or(0)
    }

    pub fn confirmed(&self) -> i64 {
        self.state.lock().confirmed
    }

    pub fn pending_for(&self, writer: &WriterIdentity) -> i64 {
        self.state.lock().pending.get(writer).copied().unwrap_or(0)
    }

    /// Confirmed usage plus every pending reservation.
    pub fn effective_usage(&self) -> i64 {
        self.state.lock().effective()
    }

    /// Admit a write of `size` bytes against `quota`, reserving it on success.
    ///
    /// A write is rejected when usage already exceeds the quota or when it
    /// would leave no free byte. Rejection releases the writer's reservation.
    pub fn try_reserve(
        &self,
        owner: &str,
        writer: &WriterIdentity,
        size: i64,
        quota: i64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let used = state.effective();
        if used > quota || quota - used - size <= 0 {
            let released = state.pending.remove(writer).unwrap_or(0);
            return Err(QuotaError::QuotaExceeded {
                owner: owner.to_string(),
                used: state.confirmed,
                quota,
                requested: size + released,
            });
        }
        *state.pending.entry(writer.clone()).or_insert(0) += size;
        Ok(())
    }
}
