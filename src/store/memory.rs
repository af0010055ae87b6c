//! In-memory bucket store
//!
//! Keeps the index in a `BTreeSet` and memberships in a map of sets.
//! Scans are keyset-paginated; with a non-zero overlap every page after the
//! first re-emits the tail of the previous page, the same way a hash-table
//! scan may return an entry more than once. Callers must deduplicate.

use super::{BucketStore, Cursor, ScanPage};
use crate::bucket::BucketId;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

const DEFAULT_PAGE_SIZE: usize = 100;
const UNLIMITED: usize = usize::MAX;

#[derive(Debug, Default)]
struct MemoryState {
    index: BTreeSet<BucketId>,
    members: HashMap<BucketId, HashSet<String>>,
    closed: bool,
}

/// Bucket store held entirely in process memory
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    page_size: usize,
    overlap: usize,
    /// Remaining successful writes before the store reports itself unavailable
    write_budget: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            page_size: DEFAULT_PAGE_SIZE,
            overlap: 0,
            write_budget: AtomicUsize::new(UNLIMITED),
        }
    }

    /// Maximum number of new bucket ids per scan page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of ids from the previous page repeated at the start of each page
    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Accept `writes` more writes, then fail every write with
    /// `StoreUnavailable`. Reads keep working.
    pub fn fail_after_writes(&self, writes: usize) {
        self.write_budget.store(writes, Ordering::SeqCst);
    }

    /// Number of buckets in the index
    pub async fn bucket_count(&self) -> usize {
        self.state.read().await.index.len()
    }

    fn take_write(&self) -> Result<()> {
        self.write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                UNLIMITED => Some(UNLIMITED),
                0 => None,
                n => Some(n - 1),
            })
            .map(|_| ())
            .map_err(|_| Error::store_unavailable("memory store stopped accepting writes"))
    }
}

fn ensure_open(state: &MemoryState) -> Result<()> {
    if state.closed {
        return Err(Error::store_unavailable("memory store is closed"));
    }
    Ok(())
}

#[async_trait]
impl BucketStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        ensure_open(&state)?;
        state.index.clear();
        state.members.clear();
        Ok(())
    }

    async fn add_to_bucket_index(&self, bucket: BucketId) -> Result<()> {
        let mut state = self.state.write().await;
        ensure_open(&state)?;
        self.take_write()?;
        state.index.insert(bucket);
        Ok(())
    }

    async fn add_member(&self, bucket: BucketId, link: &str) -> Result<()> {
        let mut state = self.state.write().await;
        ensure_open(&state)?;
        self.take_write()?;
        state
            .members
            .entry(bucket)
            .or_default()
            .insert(link.to_string());
        Ok(())
    }

    async fn scan_index(&self, cursor: Cursor) -> Result<ScanPage> {
        let state = self.state.read().await;
        ensure_open(&state)?;

        let (mut buckets, lower) = match cursor {
            Cursor::Start => (Vec::new(), Bound::Unbounded),
            Cursor::At(last) => {
                let mut repeated: Vec<BucketId> = state
                    .index
                    .range(..=last)
                    .rev()
                    .take(self.overlap)
                    .copied()
                    .collect();
                repeated.reverse();
                (repeated, Bound::Excluded(last))
            }
            Cursor::Done => {
                return Ok(ScanPage {
                    next: Cursor::Done,
                    buckets: Vec::new(),
                })
            }
        };

        let mut fresh = state.index.range((lower, Bound::Unbounded));
        let mut last = None;
        for &bucket in fresh.by_ref().take(self.page_size) {
            buckets.push(bucket);
            last = Some(bucket);
        }

        let next = match (last, fresh.next()) {
            (Some(last), Some(_)) => Cursor::At(last),
            _ => Cursor::Done,
        };

        Ok(ScanPage { next, buckets })
    }

    async fn members_of(&self, bucket: BucketId) -> Result<BTreeSet<String>> {
        let state = self.state.read().await;
        ensure_open(&state)?;
        Ok(state
            .members
            .get(&bucket)
            .map(|links| links.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.closed = true;
        state.index.clear();
        state.members.clear();
        Ok(())
    }
}
