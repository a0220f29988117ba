//! Concurrency test: parallel admission control and event processing.
//!
//! Validates that reservations never overshoot the quota and that events
//! dispatched concurrently for many writers confirm exactly once.

use std::sync::Arc;

use dag_quota::{
    Backends, ContentHash, DagDiff, MaybeHash, MemoryBlockStore, MemoryDirectory, MemoryPointers,
    PointerUpdate, QuotaConfig, QuotaFilter, WriterData, WriterIdentity,
};

fn filter_with(store: &Arc<MemoryBlockStore>, quota: i64, workers: usize) -> Arc<QuotaFilter> {
    let backends = Backends::new(
        store.clone(),
        Arc::new(MemoryDirectory::new()),
        Arc::new(MemoryPointers::new()),
    );
    let config = QuotaConfig {
        max_concurrent_events: workers,
        ..QuotaConfig::default()
    };
    Arc::new(QuotaFilter::new(config, backends, Arc::new(move |_: &str| quota)).unwrap())
}

fn writer_root(store: &MemoryBlockStore, writer: usize, version: usize) -> ContentHash {
    let leaf = store.put_block(vec![(writer % 251) as u8; 100 + version * 10], vec![]);
    let record = WriterData::new(Vec::<WriterIdentity>::new())
        .with_label(format!("writer-{writer}-v{version}"))
        .encode()
        .unwrap();
    store.put_block(record, vec![leaf])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn stress_parallel_reservations_respect_quota() {
    let store = Arc::new(MemoryBlockStore::new());
    let filter = filter_with(&store, 2001, 64);
    let writers: Vec<WriterIdentity> = (0..200)
        .map(|i| WriterIdentity::new(format!("wid_{i}")))
        .collect();
    for w in &writers {
        filter.forest().observe("shared", w);
    }

    let mut handles = Vec::new();
    for w in writers.clone() {
        let filter = Arc::clone(&filter);
        handles.push(tokio::spawn(async move { filter.allow_write(&w, 100).is_ok() }));
    }
    let mut accepted = 0;
    for h in handles {
        if h.await.unwrap() {
            accepted += 1;
        }
    }

    // 2001 - 1900 - 100 leaves one free byte; the next write would leave none.
    assert_eq!(accepted, 20);
    assert_eq!(filter.usage("shared"), Some(2000));
    assert_eq!(filter.confirmed_usage("shared"), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn stress_100_writers_concurrent_updates() {
    let store = Arc::new(MemoryBlockStore::new());
    let filter = filter_with(&store, i64::MAX, 16);
    let diff = DagDiff::new(store.clone());

    let mut expected = 0i64;
    for i in 0..100 {
        let w = WriterIdentity::new(format!("wid_{i}"));
        filter.forest().observe(if i % 2 == 0 { "even" } else { "odd" }, &w);
        let root = writer_root(&store, i, 0);
        expected += diff.recursive_size(root).await.unwrap() as i64;
        filter
            .accept_pointer_update(PointerUpdate {
                writer: w,
                original: MaybeHash::empty(),
                updated: root.into(),
            })
            .unwrap();
    }
    filter.wait_idle().await;

    let even = filter.confirmed_usage("even").unwrap();
    let odd = filter.confirmed_usage("odd").unwrap();
    assert_eq!(even + odd, expected);
    assert_eq!(filter.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn stress_reordered_updates_settle_on_tracked_root() {
    let store = Arc::new(MemoryBlockStore::new());
    let filter = filter_with(&store, i64::MAX, 32);
    let diff = DagDiff::new(store.clone());
    let w = WriterIdentity::new("wid_busy");
    filter.forest().observe("busy", &w);

    let roots: Vec<ContentHash> = (0..50).map(|v| writer_root(&store, 1, v)).collect();
    let mut previous = MaybeHash::empty();
    for root in &roots {
        filter
            .accept_pointer_update(PointerUpdate {
                writer: w.clone(),
                original: previous,
                updated: (*root).into(),
            })
            .unwrap();
        previous = (*root).into();
    }
    filter.wait_idle().await;

    // Whatever order the workers ran in, usage matches the root left tracked.
    let tracked = filter.forest().stat(&w).unwrap().root();
    let tracked = *tracked.get().unwrap();
    assert_eq!(
        filter.confirmed_usage("busy").unwrap(),
        diff.recursive_size(tracked).await.unwrap() as i64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_admission_during_confirmation() {
    let store = Arc::new(MemoryBlockStore::new());
    let filter = filter_with(&store, 1 << 40, 16);
    let writers: Vec<WriterIdentity> = (0..20)
        .map(|i| WriterIdentity::new(format!("wid_{i}")))
        .collect();
    for w in &writers {
        filter.forest().observe("mixed", w);
    }

    let mut handles = Vec::new();
    for (i, w) in writers.iter().cloned().enumerate() {
        let filter = Arc::clone(&filter);
        let root = writer_root(&store, i, 3);
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                filter.allow_write(&w, 50).unwrap();
                tokio::task::yield_now().await;
            }
            filter
                .process_pointer_update(PointerUpdate {
                    writer: w.clone(),
                    original: MaybeHash::empty(),
                    updated: root.into(),
                })
                .await
                .unwrap()
        }));
    }
    let mut total = 0;
    for h in handles {
        total += h.await.unwrap();
    }

    assert_eq!(filter.confirmed_usage("mixed"), Some(total));
    assert_eq!(filter.usage("mixed"), Some(total), "every reservation was superseded");
}
