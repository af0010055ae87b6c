//! Bucket stores
//!
//! A [`BucketStore`] holds two structures:
//!
//! - the **bucket index**: an ordered set of known bucket ids, scanned page
//!   by page with a [`Cursor`]
//! - **bucket membership**: for every bucket, the set of distinct links
//!   observed in it
//!
//! All writes are idempotent, so re-ingesting the same event is harmless and
//! concurrent writers need no coordination beyond the backend's own
//! single-operation atomicity.
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process, for tests and one-shot runs
//! - [`SqliteStore`]: SQLite file, survives restarts
//!
//! ```text
//! scan_index(Start) → (At(b2), [b0, b1, b2])
//! scan_index(At(b2)) → (At(b4), [b2, b3, b4])   // may repeat ids
//! scan_index(At(b4)) → (Done, [b5])
//! ```

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::bucket::BucketId;
use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Position in a paginated index scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Begin a new scan
    Start,
    /// Continue after the given bucket id
    At(BucketId),
    /// Scan complete
    Done,
}

impl Cursor {
    pub fn is_done(&self) -> bool {
        matches!(self, Cursor::Done)
    }
}

/// One page of an index scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the following call; [`Cursor::Done`] when finished
    pub next: Cursor,
    /// Bucket ids on this page (may repeat ids from earlier pages)
    pub buckets: Vec<BucketId>,
}

/// Storage backend for bucket index and membership
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Short backend name for logging
    fn name(&self) -> &str;

    /// Remove all buckets and memberships
    async fn reset(&self) -> Result<()>;

    /// Insert a bucket id into the ordered index (no-op if present)
    async fn add_to_bucket_index(&self, bucket: BucketId) -> Result<()>;

    /// Insert a link into the bucket's membership set (no-op if present)
    async fn add_member(&self, bucket: BucketId, link: &str) -> Result<()>;

    /// Fetch the page of the index that starts at `cursor`
    async fn scan_index(&self, cursor: Cursor) -> Result<ScanPage>;

    /// Current members of a bucket; empty for unknown buckets
    async fn members_of(&self, bucket: BucketId) -> Result<BTreeSet<String>>;

    /// Release the backend. Later calls fail with `StoreUnavailable`.
    async fn close(&self) -> Result<()>;
}

/// Open the backend selected by the configuration
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn BucketStore>> {
    config.validate()?;

    let store: Arc<dyn BucketStore> = match config.backend {
        StoreBackend::Memory => Arc::new(
            MemoryStore::new()
                .with_page_size(config.page_size)
                .with_overlap(config.scan_overlap),
        ),
        StoreBackend::Sqlite => {
            Arc::new(SqliteStore::open(&config.path)?.with_page_size(config.page_size))
        }
    };

    tracing::info!("Opened {} bucket store", store.name());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::tempdir;

    #[test]
    fn test_cursor_done() {
        assert!(Cursor::Done.is_done());
        assert!(!Cursor::Start.is_done());
        assert!(!Cursor::At(0).is_done());
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.name(), "memory");

        store.add_to_bucket_index(300).await.unwrap();
        store.add_member(300, "a").await.unwrap();
        assert_eq!(store.members_of(300).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_sqlite_store() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            path: dir.path().join("buckets.db").to_string_lossy().to_string(),
            ..StoreConfig::default()
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.name(), "sqlite");
        assert!(dir.path().join("buckets.db").exists());
    }

    #[test]
    fn test_open_rejects_zero_page_size() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            page_size: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(
            open_store(&config),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
