//! Per-writer accounting state.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as TurnLock, MutexGuard};

use crate::hash::MaybeHash;
use crate::identity::WriterIdentity;

/// Committed part of a writer's stat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatState {
    pub root: MaybeHash,
    /// Bytes charged to the owner through this writer's own root.
    pub direct_retained: i64,
    pub owned_keys: BTreeSet<WriterIdentity>,
    /// Keys dropped by the committed root whose retraction has not finished.
    pub retiring: BTreeSet<WriterIdentity>,
}

/// A tracked writer. Never removed: retracted writers stay with an absent root.
///
/// Transitions hold the writer's turn for their whole duration, including
/// the awaited diff. The committed state sits behind a separate short lock
/// so it can be read without waiting for a transition to finish.
#[derive(Debug)]
pub struct WriterStat {
    owner: String,
    turn: TurnLock<()>,
    state: Mutex<StatState>,
}

impl WriterStat {
    pub fn new(owner: impl Into<String>, state: StatState) -> Self {
        Self {
            owner: owner.into(),
            turn: TurnLock::new(()),
            state: Mutex::new(state),
        }
    }

    /// A fresh stat with no root, no storage and no owned keys.
    pub fn empty(owner: impl Into<String>) -> Self {
        Self::new(owner, StatState::default())
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Enter the writer's critical section.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    pub(crate) fn state(&self) -> StatState {
        self.state.lock().clone()
    }

    pub(crate) fn commit(&self, apply: impl FnOnce(&mut StatState)) {
        apply(&mut self.state.lock());
    }

    /// Copy of the committed state.
    pub fn view(&self) -> StatView {
        let state = self.state.lock();
        StatView {
            owner: self.owner.clone(),
            root: state.root,
            direct_retained: state.direct_retained,
            owned_keys: state.owned_keys.clone(),
            retiring: state.retiring.clone(),
        }
    }

    pub fn root(&self) -> MaybeHash {
        self.state.lock().root
    }
}

/// Serializable copy of a writer's stat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatView {
    pub owner: String,
    pub root: MaybeHash,
    pub direct_retained: i64,
    #[serde(default)]
    pub owned_keys: BTreeSet<WriterIdentity>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub retiring: BTreeSet<WriterIdentity>,
}

impl From<StatView> for WriterStat {
    fn from(view: StatView) -> Self {
        WriterStat::new(
            view.owner,
            StatState {
                root: view.root,
                direct_retained: view.direct_retained,
                owned_keys: view.owned_keys,
                retiring: view.retiring,
            },
        )
    }
}
