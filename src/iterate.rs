//! Result iteration
//!
//! Walks the bucket index page by page and hands every `(bucket, link)`
//! pair to a consumer.
//!
//! ```text
//! cursor = Start
//! loop:
//!   (next, page) = scan_index(cursor)
//!   for bucket in page not in seen:
//!       seen += bucket
//!       for link in members_of(bucket): consumer(bucket, link)
//!   stop when next == Done
//! ```
//!
//! Stores may return the same bucket id on more than one page, so the seen
//! set is what guarantees each bucket is reported once. Buckets added while
//! a scan is running may or may not be reported. A store that hands back a
//! cursor it already returned in the same scan is treated as unavailable.

use crate::bucket::BucketId;
use crate::error::{Error, Result};
use crate::store::{BucketStore, Cursor};
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

const DEFAULT_LOOKUP_CONCURRENCY: usize = 8;

/// Counters from one completed iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationSummary {
    /// `scan_index` calls made
    pub pages: usize,
    /// Distinct buckets visited
    pub buckets: usize,
    /// `(bucket, link)` pairs delivered
    pub links: usize,
}

impl std::fmt::Display for IterationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pages: {}, buckets: {}, links: {}",
            self.pages, self.buckets, self.links
        )
    }
}

/// Reads every bucket and its links back out of a store
pub struct BucketIterator<S: BucketStore + ?Sized> {
    store: Arc<S>,
    lookup_concurrency: usize,
}

impl<S: BucketStore + ?Sized> BucketIterator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            lookup_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
        }
    }

    /// Membership lookups issued in parallel within a page.
    ///
    /// Results are still delivered to the consumer in page order.
    pub fn with_lookup_concurrency(mut self, concurrency: usize) -> Self {
        self.lookup_concurrency = concurrency.max(1);
        self
    }

    /// Call `consumer` once for every link of every indexed bucket.
    ///
    /// Returns after the final page has been delivered. A bucket that is
    /// indexed but has no members yet is visited without calling the
    /// consumer.
    pub async fn iterate<F>(&self, mut consumer: F) -> Result<IterationSummary>
    where
        F: FnMut(BucketId, &str),
    {
        let mut cursor = Cursor::Start;
        let mut seen: HashSet<BucketId> = HashSet::new();
        let mut visited: HashSet<Cursor> = HashSet::from([cursor]);
        let mut summary = IterationSummary::default();

        loop {
            let page = self.store.scan_index(cursor).await?;
            summary.pages += 1;

            let page_len = page.buckets.len();
            let fresh: Vec<BucketId> = page
                .buckets
                .into_iter()
                .filter(|bucket| seen.insert(*bucket))
                .collect();

            tracing::debug!(
                "Scan page {}: {} ids, {} new",
                summary.pages,
                page_len,
                fresh.len()
            );

            let store = &self.store;
            let mut lookups = stream::iter(fresh)
                .map(|bucket| async move {
                    store.members_of(bucket).await.map(|links| (bucket, links))
                })
                .buffered(self.lookup_concurrency);

            while let Some(result) = lookups.next().await {
                let (bucket, links) = result?;
                summary.buckets += 1;
                for link in &links {
                    consumer(bucket, link);
                    summary.links += 1;
                }
            }

            if page.next.is_done() {
                break;
            }
            if !visited.insert(page.next) {
                return Err(Error::store_unavailable(format!(
                    "{} scan returned cursor {:?} twice (after {:?})",
                    self.store.name(),
                    page.next,
                    cursor
                )));
            }
            cursor = page.next;
        }

        tracing::info!("Iteration finished ({})", summary);
        Ok(summary)
    }

    /// Gather every bucket and its links into a map
    pub async fn collect(&self) -> Result<BTreeMap<BucketId, BTreeSet<String>>> {
        let mut buckets: BTreeMap<BucketId, BTreeSet<String>> = BTreeMap::new();
        self.iterate(|bucket, link| {
            buckets.entry(bucket).or_default().insert(link.to_string());
        })
        .await?;
        Ok(buckets)
    }
}
