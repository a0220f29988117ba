//! Quota filter engine.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

use super::events::RegistrationEvent;
use super::quota::QuotaPolicy;
use crate::backend::{
    ContentAddressedStorage, MutablePointers, OwnedKeysReader, UserDirectory, WriterDataReader,
};
use crate::config::QuotaConfig;
use crate::diff::DagDiff;
use crate::error::{QuotaError, Result};
use crate::forest::OwnershipForest;
use crate::identity::{PointerUpdate, SignedRootUpdate, WriterIdentity};
use crate::ledger::UsageLedger;
use crate::storage::{SnapshotStore, UsageSnapshot};

/// The external services the filter reads from.
#[derive(Clone)]
pub struct Backends {
    pub storage: Arc<dyn ContentAddressedStorage>,
    pub directory: Arc<dyn UserDirectory>,
    pub pointers: Arc<dyn MutablePointers>,
    pub owned_keys: Arc<dyn OwnedKeysReader>,
}

impl Backends {
    /// Backends whose owned keys are read from writer data records in `storage`.
    pub fn new(
        storage: Arc<dyn ContentAddressedStorage>,
        directory: Arc<dyn UserDirectory>,
        pointers: Arc<dyn MutablePointers>,
    ) -> Self {
        let owned_keys = Arc::new(WriterDataReader::new(Arc::clone(&storage)));
        Self {
            storage,
            directory,
            pointers,
            owned_keys,
        }
    }

    pub fn with_owned_keys_reader(mut self, reader: Arc<dyn OwnedKeysReader>) -> Self {
        self.owned_keys = reader;
        self
    }
}

/// Tracks storage used by every user and decides whether writes may proceed.
///
/// Events are processed on the tokio runtime, at most
/// `max_concurrent_events` at a time. A failing event is logged and dropped;
/// the next event for the same writer repairs the view.
pub struct QuotaFilter {
    forest: OwnershipForest,
    ledger: Arc<UsageLedger>,
    directory: Arc<dyn UserDirectory>,
    quota: Arc<dyn QuotaPolicy>,
    snapshots: SnapshotStore,
    config: QuotaConfig,
    workers: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
    snapshot_task: Mutex<Option<JoinHandle<()>>>,
}

impl QuotaFilter {
    /// Build an empty filter. Nothing is loaded or computed.
    pub fn new(
        config: QuotaConfig,
        backends: Backends,
        quota: Arc<dyn QuotaPolicy>,
    ) -> Result<Self> {
        config.validate()?;
        let ledger = Arc::new(UsageLedger::new());
        let forest = OwnershipForest::new(
            Arc::clone(&ledger),
            DagDiff::new(backends.storage),
            backends.pointers,
            backends.owned_keys,
        );
        Ok(Self {
            forest,
            ledger,
            directory: backends.directory,
            quota,
            snapshots: SnapshotStore::new(config.snapshot_path.clone()),
            workers: Arc::new(Semaphore::new(config.max_concurrent_events)),
            config,
            in_flight: Arc::new(InFlight::default()),
            snapshot_task: Mutex::new(None),
        })
    }

    /// Build a filter, restore usage from the snapshot or recompute it from
    /// scratch, and start periodic snapshots if configured.
    pub async fn start(
        config: QuotaConfig,
        backends: Backends,
        quota: Arc<dyn QuotaPolicy>,
    ) -> Result<Arc<Self>> {
        let filter = Arc::new(Self::new(config, backends, quota)?);
        filter.initialise().await;
        filter.spawn_snapshot_task();
        Ok(filter)
    }

    /// Load the snapshot; fall back to a full recomputation when it is unusable.
    pub async fn initialise(&self) {
        match self.snapshots.load() {
            Ok(snapshot) => {
                info!(
                    "Loaded usage of {} users from {}",
                    snapshot.usages.len(),
                    self.snapshots.path().display()
                );
                self.restore(snapshot);
                if self.config.consume_snapshot_on_load {
                    if let Err(e) = self.snapshots.remove() {
                        warn!("Could not remove consumed snapshot: {e}");
                    }
                }
            }
            Err(e) => {
                info!("{e}; recomputing usage from the DAG");
                if let Err(e) = self.recompute_all().await {
                    error!("Usage recomputation failed: {e}");
                }
            }
        }
    }

    fn restore(&self, snapshot: UsageSnapshot) {
        for (username, confirmed) in snapshot.usages {
            self.ledger.restore(&username, confirmed);
        }
        for (writer, view) in snapshot.writers {
            self.forest.restore(writer, view);
        }
    }

    /// Walk every registered user's forest from the current backend state.
    pub async fn recompute_all(&self) -> Result<()> {
        let usernames = self.directory.list_usernames("").await?;
        info!("Recomputing usage for {} users", usernames.len());
        for username in usernames {
            match self.directory.root_identity(&username).await {
                Ok(Some(identity)) => {
                    if let Err(e) = self.process_registration(&username, &identity).await {
                        warn!("Error loading storage for user {username}: {e}");
                    }
                }
                Ok(None) => debug!("User {username} has no root identity"),
                Err(e) => warn!("Could not resolve root identity of {username}: {e}"),
            }
        }
        Ok(())
    }

    // ── Event intake ──────────────────────────────────────────────────────────

    /// Track a newly registered identity and account its forest in the background.
    pub fn accept_registration(self: &Arc<Self>, event: RegistrationEvent) {
        self.forest.observe(&event.username, &event.identity);
        let filter = Arc::clone(self);
        self.dispatch(format!("registration of {}", event.identity), async move {
            filter
                .process_registration(&event.username, &event.identity)
                .await
        });
    }

    /// Queue a decoded root change. Unknown writers are rejected immediately.
    pub fn accept_pointer_update(self: &Arc<Self>, update: PointerUpdate) -> Result<()> {
        if self.forest.stat(&update.writer).is_none() {
            return Err(QuotaError::UnknownWriter(update.writer));
        }
        let filter = Arc::clone(self);
        self.dispatch(format!("pointer update of {}", update.writer), async move {
            filter.process_pointer_update(update).await.map(|_| ())
        });
        Ok(())
    }

    /// Verify a signed root change against the writer's key, then queue it.
    pub fn accept_signed_update(
        self: &Arc<Self>,
        signed: &SignedRootUpdate,
        verifying_key: &VerifyingKey,
    ) -> Result<()> {
        let update = signed.verify(verifying_key)?;
        self.accept_pointer_update(update)
    }

    /// Account `identity` and every key it owns for `username`.
    pub async fn process_registration(
        &self,
        username: &str,
        identity: &WriterIdentity,
    ) -> Result<()> {
        self.forest.sync_from_backend(username, identity).await
    }

    /// Apply a root change. Returns the confirmed byte delta.
    pub async fn process_pointer_update(&self, update: PointerUpdate) -> Result<i64> {
        let stat = self
            .forest
            .stat(&update.writer)
            .ok_or_else(|| QuotaError::UnknownWriter(update.writer.clone()))?;
        let tracked = stat.root();
        if tracked != update.original {
            debug!(
                "Update of {} expected {} but tracked root is {tracked}",
                update.writer, update.original
            );
        }
        self.forest
            .apply_pointer_update(&update.writer, update.updated)
            .await
    }

    fn dispatch<F>(self: &Arc<Self>, label: String, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let workers = Arc::clone(&self.workers);
        let guard = InFlight::enter(&self.in_flight);
        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            match work.await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    warn!("Failed processing {label}, the next event will repair it: {e}")
                }
                Err(e) => warn!("Failed processing {label}: {e}"),
            }
        });
    }

    // ── Admission control ─────────────────────────────────────────────────────

    /// Admit a write of `size` bytes by `writer`, reserving the space.
    ///
    /// Rejected writes fail with `QuotaExceeded` and release the writer's
    /// pending reservation.
    pub fn allow_write(&self, writer: &WriterIdentity, size: i64) -> Result<()> {
        let stat = self
            .forest
            .stat(writer)
            .ok_or_else(|| QuotaError::UnknownWriter(writer.clone()))?;
        let owner = stat.owner();
        let usage = self.ledger.get_or_create(owner);
        let quota = self.quota.quota(owner);

        usage.try_reserve(owner, writer, size, quota).map_err(|e| {
            debug!("Rejected write of {size} bytes by {writer}: {e}");
            e
        })
    }

    // ── Reporting ─────────────────────────────────────────────────────────────

    /// Effective usage (confirmed plus pending) of a user.
    pub fn usage(&self, username: &str) -> Option<i64> {
        self.ledger.get(username).map(|u| u.effective_usage())
    }

    pub fn confirmed_usage(&self, username: &str) -> Option<i64> {
        self.ledger.get(username).map(|u| u.confirmed())
    }

    /// Effective usage of every known user.
    pub fn usages(&self) -> BTreeMap<String, i64> {
        self.ledger.effective_usages()
    }

    pub fn quota_of(&self, username: &str) -> i64 {
        self.quota.quota(username)
    }

    pub fn forest(&self) -> &OwnershipForest {
        &self.forest
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    // ── Persistence and lifecycle ─────────────────────────────────────────────

    /// Confirmed usage and writer stats as of one instant.
    ///
    /// Safe to take while events are in flight: a delta appears in `usages`
    /// only together with the root it was charged for.
    pub fn snapshot(&self) -> UsageSnapshot {
        let (writers, usages) = self.forest.capture();
        UsageSnapshot { usages, writers }
    }

    pub fn write_snapshot(&self) -> Result<()> {
        let snapshot = self.snapshot();
        self.snapshots.save(&snapshot)?;
        debug!(
            "Stored usage of {} users to {}",
            snapshot.usages.len(),
            self.snapshots.path().display()
        );
        Ok(())
    }

    /// Write snapshots periodically while the filter is alive.
    pub fn spawn_snapshot_task(self: &Arc<Self>) {
        let Some(period) = self.config.snapshot_interval() else {
            return;
        };
        let filter = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(filter) = filter.upgrade() else {
                    break;
                };
                if let Err(e) = filter.write_snapshot() {
                    warn!("Periodic snapshot failed: {e}");
                }
            }
        });
        if let Some(previous) = self.snapshot_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Wait until every event dispatched so far has been processed.
    pub async fn wait_idle(&self) {
        self.in_flight.wait_idle().await;
    }

    /// Number of dispatched events not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Stop periodic snapshots, give in-flight events up to
    /// `shutdown_timeout_ms` to finish, then write the snapshot.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(task) = self.snapshot_task.lock().take() {
            task.abort();
        }

        let timeout = self.config.shutdown_timeout();
        if tokio::time::timeout(timeout, self.wait_idle()).await.is_err() {
            warn!(
                "{} events still in flight after {timeout:?}, storing snapshot anyway",
                self.in_flight()
            );
        }

        self.write_snapshot().map_err(|e| {
            error!("Could not store usage snapshot on shutdown: {e}");
            e
        })
    }

    /// Bounded wait used by callers that want to give up sooner than the config says.
    pub async fn drain_for(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }
}

/// Counts dispatched events so shutdown can wait for them without owning them.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(this: &Arc<Self>) -> InFlightGuard {
        this.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(this))
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}
