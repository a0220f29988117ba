//! Incremental size diff over a content-addressed store.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{try_join, try_join_all, BoxFuture};

use crate::backend::ContentAddressedStorage;
use crate::error::{QuotaError, Result};
use crate::hash::{ContentHash, MaybeHash};

/// Computes how many bytes a root change adds to or removes from storage.
#[derive(Clone)]
pub struct DagDiff {
    storage: Arc<dyn ContentAddressedStorage>,
}

impl DagDiff {
    pub fn new(storage: Arc<dyn ContentAddressedStorage>) -> Self {
        Self { storage }
    }

    /// Byte delta of moving a root from `original` to `updated`.
    ///
    /// An absent original costs the full recursive size of `updated`.
    pub async fn size_delta(&self, original: &MaybeHash, updated: &ContentHash) -> Result<i64> {
        match original.as_option() {
            None => Ok(self.recursive_size(*updated).await? as i64),
            Some(original) => self.change_in_size(*original, *updated).await,
        }
    }

    /// Own size plus the recursive size of every child.
    ///
    /// A block reachable along several paths is counted once per path.
    pub fn recursive_size(&self, hash: ContentHash) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let (own, links) = self.size_and_links(&hash).await?;
            let subtrees = try_join_all(links.into_iter().map(|link| self.recursive_size(link))).await?;
            Ok(own + subtrees.into_iter().sum::<u64>())
        })
    }

    fn change_in_size(&self, original: ContentHash, updated: ContentHash) -> BoxFuture<'_, Result<i64>> {
        Box::pin(async move {
            if original == updated {
                return Ok(0);
            }

            let ((before_size, before_links), (after_size, after_links)) = try_join(
                self.size_and_links(&original),
                self.size_and_links(&updated),
            )
            .await?;

            let object_delta = after_size as i64 - before_size as i64;
            let only_before = difference(&before_links, &after_links);
            let only_after = difference(&after_links, &before_links);

            // Changed children are paired by position: a rebalanced node tends
            // to keep its relative order. Out-of-order rebalances are misattributed.
            let n_pairs = only_before.len().min(only_after.len());
            let paired = try_join_all(
                only_before[..n_pairs]
                    .iter()
                    .zip(&only_after[..n_pairs])
                    .map(|(before, after)| self.change_in_size(*before, *after)),
            );
            let removed = self.total_size(&only_before[n_pairs..]);
            let added = self.total_size(&only_after[n_pairs..]);

            let (paired, (removed, added)) = try_join(paired, try_join(removed, added)).await?;

            Ok(object_delta + paired.into_iter().sum::<i64>() + added as i64 - removed as i64)
        })
    }

    async fn total_size(&self, hashes: &[ContentHash]) -> Result<u64> {
        let sizes = try_join_all(hashes.iter().map(|hash| self.recursive_size(*hash))).await?;
        Ok(sizes.into_iter().sum())
    }

    async fn size_and_links(&self, hash: &ContentHash) -> Result<(u64, Vec<ContentHash>)> {
        let (size, links) = try_join(self.storage.get_size(hash), self.storage.get_links(hash)).await?;
        let size =
            size.ok_or_else(|| QuotaError::StorageUnavailable(format!("block {hash} not found")))?;
        Ok((size, links))
    }
}

/// Entries of `left` absent from `right`, in `left` order.
fn difference(left: &[ContentHash], right: &[ContentHash]) -> Vec<ContentHash> {
    let right: HashSet<&ContentHash> = right.iter().collect();
    left.iter().filter(|h| !right.contains(h)).copied().collect()
}
