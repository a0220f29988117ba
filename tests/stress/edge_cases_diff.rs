//! Edge case tests: diff additivity, reordering, multiplicity, missing
//! blocks and deep DAGs.

use std::sync::Arc;

use dag_quota::{
    ContentAddressedStorage, ContentHash, DagDiff, MaybeHash, MemoryBlockStore, QuotaError,
};

fn setup() -> (Arc<MemoryBlockStore>, DagDiff) {
    let store = Arc::new(MemoryBlockStore::new());
    let diff = DagDiff::new(store.clone() as Arc<dyn ContentAddressedStorage>);
    (store, diff)
}

fn leaf(store: &MemoryBlockStore, tag: u8, size: usize) -> ContentHash {
    store.put_block(vec![tag; size], vec![])
}

async fn delta(diff: &DagDiff, from: ContentHash, to: ContentHash) -> i64 {
    diff.size_delta(&MaybeHash::present(from), &to).await.unwrap()
}

async fn size(diff: &DagDiff, root: ContentHash) -> i64 {
    diff.recursive_size(root).await.unwrap() as i64
}

// === Additivity ===

#[tokio::test]
async fn edge_append_only_history_is_additive() {
    let (store, diff) = setup();
    let x = leaf(&store, 1, 100);
    let y = leaf(&store, 2, 200);
    let z = leaf(&store, 3, 300);
    let a = store.put_block(vec![0; 8], vec![x]);
    let b = store.put_block(vec![0; 8], vec![x, y]);
    let c = store.put_block(vec![0; 8], vec![x, y, z]);

    let ab = delta(&diff, a, b).await;
    let bc = delta(&diff, b, c).await;
    assert_eq!(ab, 200);
    assert_eq!(bc, 300);
    assert_eq!(ab + bc, delta(&diff, a, c).await);
    assert_eq!(delta(&diff, a, c).await, size(&diff, c).await - size(&diff, a).await);
}

#[tokio::test]
async fn edge_remove_only_history_is_additive() {
    let (store, diff) = setup();
    let x = leaf(&store, 1, 100);
    let y = leaf(&store, 2, 200);
    let z = leaf(&store, 3, 300);
    let a = store.put_block(vec![0; 16], vec![x, y, z]);
    let b = store.put_block(vec![0; 12], vec![x, z]);
    let c = store.put_block(vec![0; 4], vec![z]);

    let ab = delta(&diff, a, b).await;
    let bc = delta(&diff, b, c).await;
    assert_eq!(ab, -204);
    assert_eq!(bc, -108);
    assert_eq!(ab + bc, delta(&diff, a, c).await);
}

#[tokio::test]
async fn edge_round_trip_cancels() {
    let (store, diff) = setup();
    let x = leaf(&store, 1, 100);
    let nested = store.put_block(vec![9; 40], vec![x, leaf(&store, 2, 60)]);
    let a = store.put_block(vec![0; 10], vec![x]);
    let b = store.put_block(vec![0; 30], vec![nested, leaf(&store, 3, 7)]);

    assert_eq!(delta(&diff, a, b).await + delta(&diff, b, a).await, 0);
}

// === Structure ===

#[tokio::test]
async fn edge_reordered_children_cost_nothing() {
    let (store, diff) = setup();
    let x = leaf(&store, 1, 100);
    let y = leaf(&store, 2, 200);
    let before = store.put_block(vec![0; 8], vec![x, y]);
    let after = store.put_block(vec![1; 8], vec![y, x]);

    assert_eq!(delta(&diff, before, after).await, 0);
}

#[tokio::test]
async fn edge_multiplicity_is_ignored_by_the_child_diff() {
    let (store, diff) = setup();
    let x = leaf(&store, 1, 100);
    let twice = store.put_block(vec![0; 8], vec![x, x]);
    let once = store.put_block(vec![1; 8], vec![x]);

    // recursive size counts both paths, the child diff compares hash sets
    assert_eq!(size(&diff, twice).await, 208);
    assert_eq!(size(&diff, once).await, 108);
    assert_eq!(delta(&diff, twice, once).await, 0);
}

#[tokio::test]
async fn edge_unequal_replacement_counts() {
    let (store, diff) = setup();
    let a1 = leaf(&store, 1, 10);
    let a2 = leaf(&store, 2, 20);
    let b1 = leaf(&store, 3, 15);
    let b2 = leaf(&store, 4, 25);
    let b3 = leaf(&store, 5, 35);
    let before = store.put_block(vec![0; 8], vec![a1, a2]);
    let after = store.put_block(vec![0; 8], vec![b1, b2, b3]);

    // two pairs plus one fully added child
    assert_eq!(delta(&diff, before, after).await, 5 + 5 + 35);
}

#[tokio::test]
async fn edge_leaf_to_leaf() {
    let (store, diff) = setup();
    let small = leaf(&store, 1, 3);
    let large = leaf(&store, 1, 3000);
    assert_eq!(delta(&diff, small, large).await, 2997);
    assert_eq!(delta(&diff, large, small).await, -2997);
}

// === Missing blocks ===

#[tokio::test]
async fn edge_missing_block_in_new_subtree_fails() {
    let (store, diff) = setup();
    let x = leaf(&store, 1, 100);
    let gone = leaf(&store, 2, 50);
    let before = store.put_block(vec![0; 8], vec![x]);
    let after = store.put_block(vec![0; 8], vec![x, gone]);
    store.remove_block(&gone);

    let result = diff.size_delta(&MaybeHash::present(before), &after).await;
    assert!(matches!(result, Err(QuotaError::StorageUnavailable(_))));
}

#[tokio::test]
async fn edge_missing_block_in_shared_subtree_is_not_read() {
    let (store, diff) = setup();
    let deep = leaf(&store, 1, 100);
    let shared = store.put_block(vec![2; 10], vec![deep]);
    let before = store.put_block(vec![0; 8], vec![shared]);
    let after = store.put_block(vec![0; 9], vec![shared]);
    store.remove_block(&deep);

    assert_eq!(delta(&diff, before, after).await, 1);
}

#[tokio::test]
async fn edge_missing_updated_root_fails() {
    let (_store, diff) = setup();
    let result = diff
        .size_delta(&MaybeHash::empty(), &ContentHash::of(b"never stored"))
        .await;
    assert!(matches!(result, Err(QuotaError::StorageUnavailable(_))));
}

// === Depth ===

#[tokio::test]
async fn edge_deep_path_change_walks_only_the_path() {
    let (store, diff) = setup();
    let depth = 200;
    let sibling = leaf(&store, 7, 1000);

    let mut before = leaf(&store, 1, 10);
    let mut after = leaf(&store, 1, 11);
    for level in 0..depth {
        let tag = vec![(level % 250) as u8; 4];
        before = store.put_block(tag.clone(), vec![before, sibling]);
        after = store.put_block(tag, vec![after, sibling]);
    }

    assert_eq!(
        size(&diff, before).await,
        10 + depth as i64 * (4 + 1000)
    );

    let fetches = store.link_fetches();
    assert_eq!(delta(&diff, before, after).await, 1);
    assert_eq!(store.link_fetches() - fetches, 2 * (depth as u64 + 1));
}
