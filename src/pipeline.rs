//! Ingestion Pipeline
//!
//! Drives events into a [`BucketStore`]:
//!
//! ```text
//! RawRecord → parse → Event → bucket(time) → add_to_bucket_index
//!                                           → add_member
//! ```
//!
//! Both store writes are idempotent and commute across events, so up to
//! `concurrency` events are written at once in no particular order. An
//! event counts as acknowledged once both writes succeeded. A crash between
//! the two leaves an indexed bucket without that member, which readers
//! treat as a normal state.

use crate::bucket::BucketWidth;
use crate::error::{Error, Result};
use crate::event::{parse, Event, RawRecord};
use crate::source::SourceRecord;
use crate::store::BucketStore;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_CONCURRENCY: usize = 16;

/// What to do with a record that fails to parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Log it, count it and carry on
    #[default]
    Skip,
    /// Stop before writing anything and return the error
    Abort,
}

/// Outcome of [`IngestPipeline::ingest_records`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Events written to the store
    pub processed: usize,
    /// Records dropped as malformed
    pub skipped: usize,
}

impl std::fmt::Display for IngestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "processed: {}, skipped: {}", self.processed, self.skipped)
    }
}

/// Writes events into bucket index and membership sets
pub struct IngestPipeline<S: BucketStore + ?Sized> {
    store: Arc<S>,
    width: BucketWidth,
    concurrency: usize,
}

impl<S: BucketStore + ?Sized> IngestPipeline<S> {
    pub fn new(store: Arc<S>, width: BucketWidth) -> Self {
        Self {
            store,
            width,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Number of events whose writes may be in flight at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn width(&self) -> BucketWidth {
        self.width
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Clear the store so the run starts from an empty index
    pub async fn start_clean(&self) -> Result<()> {
        self.store.reset().await?;
        tracing::info!("Reset {} store", self.store.name());
        Ok(())
    }

    /// Write every event and return how many were written.
    ///
    /// Returns only once all issued writes are acknowledged. On a store
    /// failure the remaining writes are dropped and the error carries the
    /// number of events acknowledged so far. An event whose bucket start is
    /// not representable stops ingestion with `MalformedRecord`.
    pub async fn ingest<I>(&self, events: I) -> Result<usize>
    where
        I: IntoIterator<Item = Event>,
    {
        let width = self.width;
        let store = &self.store;

        let mut writes = stream::iter(events)
            .map(|event| async move {
                let bucket = width.bucket(event.time)?;
                store.add_to_bucket_index(bucket).await?;
                store.add_member(bucket, &event.link).await?;
                Ok::<_, Error>(())
            })
            .buffer_unordered(self.concurrency);

        let mut acknowledged = 0;
        while let Some(result) = writes.next().await {
            if let Err(e) = result {
                tracing::error!(
                    "Ingestion stopped after {} acknowledged events: {}",
                    acknowledged,
                    e
                );
                return Err(e.with_acknowledged(acknowledged));
            }
            acknowledged += 1;
        }

        tracing::debug!("Ingested {} events into {}", acknowledged, self.store.name());
        Ok(acknowledged)
    }

    /// Parse records, apply `policy` to malformed ones, then ingest the rest
    pub async fn ingest_records<I>(&self, records: I, policy: MalformedPolicy) -> Result<IngestReport>
    where
        I: IntoIterator<Item = SourceRecord>,
    {
        let mut events = Vec::new();
        let mut skipped = 0;

        for record in records {
            let parsed = record
                .raw
                .and_then(|raw| parse(&raw))
                .and_then(|event| self.width.bucket(event.time).map(|_| event))
                .map_err(|e| e.at_line(record.line));

            match parsed {
                Ok(event) => events.push(event),
                Err(e) if e.is_malformed() && policy == MalformedPolicy::Skip => {
                    tracing::warn!("Skipping record: {}", e);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let processed = self.ingest(events).await?;
        let report = IngestReport { processed, skipped };
        tracing::info!("Ingestion finished ({})", report);
        Ok(report)
    }

    /// Like [`ingest_records`](Self::ingest_records) for records without a
    /// source file; positions are numbered from 1.
    pub async fn ingest_raw<I>(&self, records: I, policy: MalformedPolicy) -> Result<IngestReport>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let numbered = records
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| SourceRecord::new(idx + 1, raw));
        self.ingest_records(numbered, policy).await
    }
}
