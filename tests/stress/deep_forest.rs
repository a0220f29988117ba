//! Scale test: deep and wide ownership forests, and ownership cycles.

use std::sync::Arc;
use std::time::Duration;

use dag_quota::{
    Backends, ContentHash, DagDiff, MaybeHash, MemoryBlockStore, MemoryDirectory, MemoryPointers,
    PointerUpdate, QuotaConfig, QuotaFilter, RegistrationEvent, WriterData, WriterIdentity,
};

struct Node {
    store: Arc<MemoryBlockStore>,
    pointers: Arc<MemoryPointers>,
    directory: Arc<MemoryDirectory>,
    filter: Arc<QuotaFilter>,
}

impl Node {
    fn new() -> Self {
        let store = Arc::new(MemoryBlockStore::new());
        let pointers = Arc::new(MemoryPointers::new());
        let directory = Arc::new(MemoryDirectory::new());
        let backends = Backends::new(store.clone(), directory.clone(), pointers.clone());
        let filter = QuotaFilter::new(
            QuotaConfig::default(),
            backends,
            Arc::new(|_: &str| i64::MAX),
        )
        .unwrap();
        Self {
            store,
            pointers,
            directory,
            filter: Arc::new(filter),
        }
    }

    fn publish(&self, writer: &WriterIdentity, owned: &[WriterIdentity], data: usize) -> ContentHash {
        let mut payload = writer.as_str().as_bytes().to_vec();
        payload.resize(data.max(payload.len()), 1);
        let leaf = self.store.put_block(payload, vec![]);
        let record = WriterData::new(owned.iter().cloned()).encode().unwrap();
        let root = self.store.put_block(record, vec![leaf]);
        self.pointers.set_root(writer, root.into());
        root
    }

    async fn size(&self, root: ContentHash) -> i64 {
        DagDiff::new(self.store.clone())
            .recursive_size(root)
            .await
            .unwrap() as i64
    }
}

fn writers(prefix: &str, n: usize) -> Vec<WriterIdentity> {
    (0..n)
        .map(|i| WriterIdentity::new(format!("wid_{prefix}{i}")))
        .collect()
}

#[tokio::test]
async fn stress_chain_of_100_owned_keys() {
    let node = Node::new();
    let chain = writers("chain", 100);
    let mut sizes = Vec::new();
    for (i, w) in chain.iter().enumerate() {
        let owned: Vec<WriterIdentity> = chain.get(i + 1).cloned().into_iter().collect();
        let root = node.publish(w, &owned, 64 + i);
        sizes.push(node.size(root).await);
    }
    node.directory.register("deep", chain[0].clone());

    node.filter.recompute_all().await.unwrap();
    assert_eq!(node.filter.forest().len(), 100);
    assert_eq!(node.filter.confirmed_usage("deep"), Some(sizes.iter().sum()));
    assert_eq!(node.filter.forest().descendants(&chain[0]).len(), 99);

    // Cutting the chain at 50 releases everything below it.
    let cut_root = node.publish(&chain[50], &[], 64 + 50);
    let original = node.filter.forest().stat(&chain[50]).unwrap().root();
    node.filter
        .process_pointer_update(PointerUpdate {
            writer: chain[50].clone(),
            original,
            updated: cut_root.into(),
        })
        .await
        .unwrap();
    let kept: i64 = sizes[..50].iter().sum::<i64>() + node.size(cut_root).await;
    assert_eq!(node.filter.confirmed_usage("deep"), Some(kept));
    for w in &chain[51..] {
        assert!(!node.filter.forest().stat(w).unwrap().root().is_present());
    }
}

#[tokio::test]
async fn stress_root_owning_500_keys() {
    let node = Node::new();
    let root_writer = WriterIdentity::new("wid_wide");
    let children = writers("leaf", 500);
    let mut total = 0;
    for w in &children {
        total += node.size(node.publish(w, &[], 32)).await;
    }
    let root = node.publish(&root_writer, &children, 10);
    total += node.size(root).await;
    node.directory.register("wide", root_writer.clone());

    node.filter.recompute_all().await.unwrap();
    assert_eq!(node.filter.confirmed_usage("wide"), Some(total));

    node.filter
        .process_pointer_update(PointerUpdate {
            writer: root_writer.clone(),
            original: root.into(),
            updated: MaybeHash::empty(),
        })
        .await
        .unwrap();
    assert_eq!(node.filter.confirmed_usage("wide"), Some(0));
}

#[tokio::test]
async fn stress_ownership_ring_terminates() {
    let node = Node::new();
    let ring = writers("ring", 10);
    let mut total = 0;
    for (i, w) in ring.iter().enumerate() {
        let next = ring[(i + 1) % ring.len()].clone();
        total += node.size(node.publish(w, &[next], 100)).await;
    }
    node.directory.register("ring", ring[0].clone());

    tokio::time::timeout(Duration::from_secs(10), node.filter.recompute_all())
        .await
        .expect("cyclic ownership does not deadlock")
        .unwrap();
    assert_eq!(node.filter.confirmed_usage("ring"), Some(total));

    let original = node.filter.forest().stat(&ring[0]).unwrap().root();
    tokio::time::timeout(
        Duration::from_secs(10),
        node.filter.process_pointer_update(PointerUpdate {
            writer: ring[0].clone(),
            original,
            updated: MaybeHash::empty(),
        }),
    )
    .await
    .expect("cyclic retraction does not deadlock")
    .unwrap();
    assert_eq!(node.filter.confirmed_usage("ring"), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn stress_50_users_registered_concurrently() {
    let node = Node::new();
    let mut expected = Vec::new();
    for u in 0..50 {
        let root = WriterIdentity::new(format!("wid_user{u}"));
        let kids = writers(&format!("u{u}k"), 5);
        let mut total = 0;
        for k in &kids {
            total += node.size(node.publish(k, &[], 200 + u)).await;
        }
        total += node.size(node.publish(&root, &kids, 50)).await;
        expected.push((format!("user{u}"), root, total));
    }

    for (username, root, _) in &expected {
        node.filter
            .accept_registration(RegistrationEvent::new(username.clone(), root.clone()));
    }
    node.filter.wait_idle().await;

    for (username, _, total) in &expected {
        assert_eq!(node.filter.confirmed_usage(username), Some(*total), "{username}");
    }
    assert_eq!(node.filter.forest().len(), 50 * 6);
}
