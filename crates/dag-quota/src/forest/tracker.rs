//! Pointer-update state machine over the ownership forest.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use log::{debug, warn};
use parking_lot::RwLock;

use super::stat::{StatView, WriterStat};
use crate::backend::{MutablePointers, OwnedKeysReader};
use crate::diff::DagDiff;
use crate::error::{QuotaError, Result};
use crate::hash::{ContentHash, MaybeHash};
use crate::identity::WriterIdentity;
use crate::ledger::UsageLedger;
use crate::map::{ConcurrentMap, ShardedMap};

/// Live view of every writer and the keys it owns.
///
/// Transitions for one writer are serialized by that writer's lock; distinct
/// writers, including disjoint subtrees during a cascade, proceed in parallel.
/// Ownership edges are assumed to form a tree. An edge back to the writer
/// itself or to one of its ancestors is ignored.
///
/// A transition confirms its delta and commits the writer's new state in one
/// step under the shared side of `commits`; [`capture`](Self::capture) takes
/// the exclusive side, so it never sees one without the other.
pub struct OwnershipForest {
    view: Box<dyn ConcurrentMap<WriterIdentity, WriterStat>>,
    commits: RwLock<()>,
    ledger: Arc<UsageLedger>,
    diff: DagDiff,
    pointers: Arc<dyn MutablePointers>,
    owned_keys: Arc<dyn OwnedKeysReader>,
}

impl OwnershipForest {
    pub fn new(
        ledger: Arc<UsageLedger>,
        diff: DagDiff,
        pointers: Arc<dyn MutablePointers>,
        owned_keys: Arc<dyn OwnedKeysReader>,
    ) -> Self {
        Self::with_map(Box::new(ShardedMap::new()), ledger, diff, pointers, owned_keys)
    }

    /// Use an alternative map backing.
    pub fn with_map(
        view: Box<dyn ConcurrentMap<WriterIdentity, WriterStat>>,
        ledger: Arc<UsageLedger>,
        diff: DagDiff,
        pointers: Arc<dyn MutablePointers>,
        owned_keys: Arc<dyn OwnedKeysReader>,
    ) -> Self {
        Self {
            view,
            commits: RwLock::new(()),
            ledger,
            diff,
            pointers,
            owned_keys,
        }
    }

    pub fn stat(&self, writer: &WriterIdentity) -> Option<Arc<WriterStat>> {
        self.view.get(writer)
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    /// Ensure `writer` is tracked for `username`. Existing stats are left alone.
    pub fn observe(&self, username: &str, writer: &WriterIdentity) -> Arc<WriterStat> {
        self.ledger.get_or_create(username);
        self.view
            .get_or_insert_with(writer.clone(), &mut || WriterStat::empty(username))
    }

    /// Bring `writer` and everything it owns up to date with the backend.
    ///
    /// Fails only when the writer's own pointer cannot be read; failures
    /// further down the forest are logged and skipped.
    pub async fn sync_from_backend(&self, username: &str, writer: &WriterIdentity) -> Result<()> {
        self.sync_subtree(username, writer, &[]).await
    }

    fn sync_subtree<'a>(
        &'a self,
        username: &'a str,
        writer: &'a WriterIdentity,
        ancestors: &'a [WriterIdentity],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let stat = self.observe(username, writer);
            let root = self.pointers.current_root(writer).await?;
            if let Err(e) = self.apply_pointer_update(writer, root).await {
                warn!("Could not account root {root} of {writer} for {username}: {e}");
            }

            let children = stat.view().owned_keys;
            let lineage = extend(ancestors, writer);
            let children: Vec<&WriterIdentity> = children
                .iter()
                .filter(|child| !lineage.contains(child))
                .collect();

            let results = join_all(
                children
                    .iter()
                    .map(|child| self.sync_subtree(username, child, &lineage)),
            )
            .await;
            for (child, result) in children.iter().zip(results) {
                if let Err(e) = result {
                    warn!("Could not load storage of {child} owned by {writer}: {e}");
                }
            }
            Ok(())
        })
    }

    /// Move `writer` to `new_root`, charging the size change to its owner.
    ///
    /// Returns the byte delta confirmed into the owner's ledger. On error the
    /// writer's stat and the ledger are left untouched. Moving to the root
    /// already tracked is a no-op, apart from finishing any retraction a
    /// previous run left behind.
    pub async fn apply_pointer_update(
        &self,
        writer: &WriterIdentity,
        new_root: MaybeHash,
    ) -> Result<i64> {
        self.transition(writer, new_root, &[]).await
    }

    fn transition<'a>(
        &'a self,
        writer: &'a WriterIdentity,
        new_root: MaybeHash,
        ancestors: &'a [WriterIdentity],
    ) -> BoxFuture<'a, Result<i64>> {
        Box::pin(async move {
            let stat = self
                .stat(writer)
                .ok_or_else(|| QuotaError::UnknownWriter(writer.clone()))?;
            let _turn = stat.lock().await;
            let current = stat.state();
            if current.root == new_root && current.retiring.is_empty() {
                return Ok(0);
            }

            let usage = self.ledger.get_or_create(stat.owner());
            let lineage = extend(ancestors, writer);

            if current.root == new_root {
                debug!(
                    "Finishing retraction of {} keys dropped by {writer}",
                    current.retiring.len()
                );
                self.finish_retiring(&stat, current.retiring, &lineage).await;
                return Ok(0);
            }

            let updated = match new_root.as_option() {
                Some(updated) => *updated,
                None => {
                    let released = current.direct_retained;
                    let orphaned: BTreeSet<WriterIdentity> = current
                        .owned_keys
                        .union(&current.retiring)
                        .cloned()
                        .collect();
                    self.commit(|| {
                        usage.confirm(writer, -released);
                        stat.commit(|s| {
                            s.root = MaybeHash::empty();
                            s.direct_retained = 0;
                            s.owned_keys.clear();
                            s.retiring = orphaned.clone();
                        });
                    });
                    debug!("Retracted {writer}: released {released} bytes from {}", stat.owner());

                    self.finish_retiring(&stat, orphaned, &lineage).await;
                    return Ok(-released);
                }
            };

            let delta = self.diff.size_delta(&current.root, &updated).await?;
            let owned = self.read_owned_keys(writer, &updated).await?;
            for child in &owned {
                self.observe(stat.owner(), child);
            }
            let removed: BTreeSet<WriterIdentity> = current
                .owned_keys
                .union(&current.retiring)
                .filter(|w| !owned.contains(*w))
                .cloned()
                .collect();

            self.commit(|| {
                usage.confirm(writer, delta);
                stat.commit(|s| {
                    s.root = new_root;
                    s.direct_retained += delta;
                    s.owned_keys = owned;
                    s.retiring = removed.clone();
                });
            });
            debug!(
                "Moved {writer} {} -> {updated}: {delta} bytes charged to {}",
                current.root,
                stat.owner()
            );

            self.finish_retiring(&stat, removed, &lineage).await;
            Ok(delta)
        })
    }

    /// Run `apply` as one commit: [`capture`](Self::capture) sees all of it or none of it.
    fn commit(&self, apply: impl FnOnce()) {
        let _shared = self.commits.read();
        apply();
    }

    async fn finish_retiring(
        &self,
        stat: &WriterStat,
        retiring: BTreeSet<WriterIdentity>,
        lineage: &[WriterIdentity],
    ) {
        if retiring.is_empty() {
            return;
        }
        let retiring: Vec<WriterIdentity> = retiring.into_iter().collect();
        self.retract_all(&retiring, lineage).await;
        stat.commit(|s| s.retiring.clear());
    }

    async fn retract_all(&self, writers: &[WriterIdentity], lineage: &[WriterIdentity]) {
        let targets: Vec<&WriterIdentity> = writers
            .iter()
            .filter(|w| {
                let cyclic = lineage.contains(w);
                if cyclic {
                    warn!("Ownership cycle through {w}, not retracting it again");
                }
                !cyclic
            })
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|w| self.transition(w, MaybeHash::empty(), lineage)),
        )
        .await;
        for (w, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                warn!("Could not retract owned key {w}: {e}");
            }
        }
    }

    async fn read_owned_keys(
        &self,
        writer: &WriterIdentity,
        root: &ContentHash,
    ) -> Result<BTreeSet<WriterIdentity>> {
        let mut owned = self.owned_keys.owned_keys(writer, root).await?;
        if owned.remove(writer) {
            warn!("Writer {writer} lists itself as an owned key, ignoring");
        }
        Ok(owned)
    }

    /// Every identity reachable from `writer` through owned-key edges.
    pub fn descendants(&self, writer: &WriterIdentity) -> BTreeSet<WriterIdentity> {
        let mut seen = BTreeSet::new();
        let mut queue = vec![writer.clone()];
        while let Some(next) = queue.pop() {
            let Some(stat) = self.stat(&next) else {
                continue;
            };
            for child in stat.view().owned_keys {
                if child != *writer && seen.insert(child.clone()) {
                    queue.push(child);
                }
            }
        }
        seen
    }

    /// Copy of every writer's committed stat.
    pub fn views(&self) -> BTreeMap<WriterIdentity, StatView> {
        self.view
            .entries()
            .into_iter()
            .map(|(writer, stat)| (writer, stat.view()))
            .collect()
    }

    /// Writer stats and confirmed usage per user, taken between commits.
    ///
    /// Every delta in the usages belongs to a root present in the views.
    pub fn capture(&self) -> (BTreeMap<WriterIdentity, StatView>, BTreeMap<String, i64>) {
        let _exclusive = self.commits.write();
        (self.views(), self.ledger.confirmed_usages())
    }

    /// Reinstate a writer from a snapshot, replacing any existing stat.
    pub fn restore(&self, writer: WriterIdentity, view: StatView) {
        self.ledger.get_or_create(&view.owner);
        self.view.insert(writer, view.into());
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }
}

fn extend(ancestors: &[WriterIdentity], writer: &WriterIdentity) -> Vec<WriterIdentity> {
    let mut lineage = Vec::with_capacity(ancestors.len() + 1);
    lineage.extend_from_slice(ancestors);
    lineage.push(writer.clone());
    lineage
}
