//! SQLite bucket store
//!
//! Two tables back the store:
//!
//! - `bucket_index(bucket_id)`: the ordered index; the integer primary key
//!   keeps it sorted and unique
//! - `bucket_members(bucket_id, link)`: one row per distinct link per bucket
//!
//! Writes use `INSERT OR IGNORE`, which makes them idempotent. Scans use
//! keyset pagination on `bucket_id`, so a cursor is just the last id seen.

use super::{BucketStore, Cursor, ScanPage};
use crate::bucket::BucketId;
use crate::error::{Error, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Bucket store persisted in a SQLite database
pub struct SqliteStore {
    /// `None` once closed (std Mutex because `Connection` is !Sync)
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
    page_size: usize,
}

impl SqliteStore {
    /// Create or open the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS bucket_index (
                bucket_id INTEGER PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS bucket_members (
                bucket_id INTEGER NOT NULL,
                link TEXT NOT NULL,
                PRIMARY KEY (bucket_id, link)
            ) WITHOUT ROWID;
            ",
        )?;

        tracing::debug!("Initialized bucket tables in {:?}", path);

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Maximum number of bucket ids per scan page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Database file path (`None` for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of buckets in the index
    pub fn bucket_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM bucket_index", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|e| Error::store_unavailable(format!("sqlite store lock poisoned: {}", e)))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock()?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::store_unavailable("sqlite store is closed"))?;
        f(conn)
    }
}

#[async_trait]
impl BucketStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn reset(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                DELETE FROM bucket_members;
                DELETE FROM bucket_index;
                ",
            )?;
            Ok(())
        })
    }

    async fn add_to_bucket_index(&self, bucket: BucketId) -> Result<()> {
        self.with_conn(|conn| {
            conn.prepare_cached("INSERT OR IGNORE INTO bucket_index (bucket_id) VALUES (?1)")?
                .execute(params![bucket])?;
            Ok(())
        })
    }

    async fn add_member(&self, bucket: BucketId, link: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT OR IGNORE INTO bucket_members (bucket_id, link) VALUES (?1, ?2)",
            )?
            .execute(params![bucket, link])?;
            Ok(())
        })
    }

    async fn scan_index(&self, cursor: Cursor) -> Result<ScanPage> {
        let after = match cursor {
            Cursor::Start => None,
            Cursor::At(last) => Some(last),
            Cursor::Done => {
                return Ok(ScanPage {
                    next: Cursor::Done,
                    buckets: Vec::new(),
                })
            }
        };

        // One extra row tells us whether another page follows
        let limit = self.page_size as i64 + 1;

        let mut buckets = self.with_conn(|conn| {
            let rows = match after {
                None => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT bucket_id FROM bucket_index ORDER BY bucket_id LIMIT ?1",
                    )?;
                    let rows = stmt.query_map(params![limit], |row| row.get(0))?;
                    rows.collect::<std::result::Result<Vec<BucketId>, _>>()?
                }
                Some(last) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT bucket_id FROM bucket_index WHERE bucket_id > ?1
                         ORDER BY bucket_id LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![last, limit], |row| row.get(0))?;
                    rows.collect::<std::result::Result<Vec<BucketId>, _>>()?
                }
            };
            Ok(rows)
        })?;

        let next = if buckets.len() > self.page_size {
            buckets.truncate(self.page_size);
            buckets.last().map(|&b| Cursor::At(b)).unwrap_or(Cursor::Done)
        } else {
            Cursor::Done
        };

        Ok(ScanPage { next, buckets })
    }

    async fn members_of(&self, bucket: BucketId) -> Result<BTreeSet<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT link FROM bucket_members WHERE bucket_id = ?1")?;
            let rows = stmt.query_map(params![bucket], |row| row.get::<_, String>(0))?;
            let links = rows.collect::<std::result::Result<BTreeSet<String>, _>>()?;
            Ok(links)
        })
    }

    async fn close(&self) -> Result<()> {
        let conn = self.lock()?.take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| Error::store_unavailable(e))?;
            tracing::debug!("Closed sqlite bucket store {:?}", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_store_creation() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("buckets.db")).unwrap();
        assert_eq!(store.bucket_count().unwrap(), 0);
        assert!(store.path().is_some());
    }

    #[tokio::test]
    async fn test_idempotent_writes() {
        let store = SqliteStore::open_in_memory().unwrap();

        for _ in 0..3 {
            store.add_to_bucket_index(23425200).await.unwrap();
            store.add_member(23425200, "linkone").await.unwrap();
        }
        store.add_member(23425200, "linktwo").await.unwrap();

        assert_eq!(store.bucket_count().unwrap(), 1);
        let members = store.members_of(23425200).await.unwrap();
        assert_eq!(
            members.into_iter().collect::<Vec<_>>(),
            vec!["linkone", "linktwo"]
        );
    }

    #[tokio::test]
    async fn test_unknown_bucket_has_no_members() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_to_bucket_index(600).await.unwrap();
        assert!(store.members_of(600).await.unwrap().is_empty());
        assert!(store.members_of(900).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_pagination() {
        let store = SqliteStore::open_in_memory().unwrap().with_page_size(3);
        // Inserted out of order; the index keeps them sorted
        for b in [700, -100, 0, 300, 100, 500, 200] {
            store.add_to_bucket_index(b).await.unwrap();
        }

        let page = store.scan_index(Cursor::Start).await.unwrap();
        assert_eq!(page.buckets, vec![-100, 0, 100]);
        assert_eq!(page.next, Cursor::At(100));

        let page = store.scan_index(page.next).await.unwrap();
        assert_eq!(page.buckets, vec![200, 300, 500]);
        assert_eq!(page.next, Cursor::At(500));

        let page = store.scan_index(page.next).await.unwrap();
        assert_eq!(page.buckets, vec![700]);
        assert_eq!(page.next, Cursor::Done);
    }

    #[tokio::test]
    async fn test_scan_full_last_page() {
        let store = SqliteStore::open_in_memory().unwrap().with_page_size(2);
        for b in [0, 100] {
            store.add_to_bucket_index(b).await.unwrap();
        }
        let page = store.scan_index(Cursor::Start).await.unwrap();
        assert_eq!(page.buckets, vec![0, 100]);
        assert_eq!(page.next, Cursor::Done);
    }

    #[tokio::test]
    async fn test_reset() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_to_bucket_index(300).await.unwrap();
        store.add_member(300, "x").await.unwrap();

        store.reset().await.unwrap();

        assert_eq!(store.bucket_count().unwrap(), 0);
        assert!(store.members_of(300).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("buckets.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.add_to_bucket_index(23534100).await.unwrap();
            store.add_member(23534100, "linkthree").await.unwrap();
            store.close().await.unwrap();
        }

        {
            let store = SqliteStore::open(&path).unwrap();
            assert_eq!(store.bucket_count().unwrap(), 1);
            let members = store.members_of(23534100).await.unwrap();
            assert!(members.contains("linkthree"));
        }
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.close().await.unwrap();
        // Closing twice is fine
        store.close().await.unwrap();

        let err = store.add_member(1, "x").await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
        assert!(store.bucket_count().is_err());
    }
}
