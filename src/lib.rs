//! # Linkbucket
//!
//! Time-bucketed aggregation of link events. Each `(time, link)` event is
//! assigned to a fixed-width time bucket; the link is added to that bucket's
//! membership set and the bucket id to an ordered index. Reading walks the
//! index with a cursor and reports every `(bucket, link)` pair once.
//!
//! ## Modules
//!
//! - [`bucket`]: time → bucket quantization
//! - [`event`]: parsing raw records into events
//! - [`store`]: bucket store trait with memory and SQLite backends
//! - [`pipeline`]: ingestion into a store
//! - [`iterate`]: cursor-based iteration over stored buckets
//! - [`source`]: reading records from files
//! - [`generate`]: random test input
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linkbucket::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("./buckets.db")?);
//!
//!     let pipeline = IngestPipeline::new(store.clone(), BucketWidth::new(300)?);
//!     pipeline.start_clean().await?;
//!     pipeline
//!         .ingest(vec![
//!             Event::new(23425332, "linkone"),
//!             Event::new(23425300, "linktwo"),
//!         ])
//!         .await?;
//!
//!     BucketIterator::new(store.clone())
//!         .iterate(|bucket, link| println!("time: {} link: {}", bucket, link))
//!         .await?;
//!
//!     store.close().await?;
//!     Ok(())
//! }
//! ```

pub mod bucket;
pub mod config;
pub mod error;
pub mod event;
pub mod generate;
pub mod iterate;
pub mod pipeline;
pub mod source;
pub mod store;

pub use bucket::{bucket, BucketId, BucketWidth, DEFAULT_WIDTH_SECS};
pub use config::{Config, ConfigError, LoggingConfig, StoreBackend, StoreConfig};
pub use error::{Error, Result};
pub use event::{parse, Event, Parser, RawRecord, RawTime};
pub use generate::{generate_lines, GeneratorConfig};
pub use iterate::{BucketIterator, IterationSummary};
pub use pipeline::{IngestPipeline, IngestReport, MalformedPolicy};
pub use source::{read_files, read_records, SourceFormat, SourceRecord};
pub use store::{open_store, BucketStore, Cursor, MemoryStore, ScanPage, SqliteStore};
