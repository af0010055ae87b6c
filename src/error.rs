//! Error types
//!
//! Every fallible operation in the crate returns [`Result`]. Parsing,
//! store access and configuration each have their own variant so callers
//! can decide per category whether to skip, retry or abort.

use thiserror::Error;

/// Errors raised by the bucketizer, parser, stores and pipelines
#[derive(Error, Debug)]
pub enum Error {
    /// A raw record could not be turned into an event
    #[error("Malformed record{}: {}", line_suffix(.line), .reason)]
    MalformedRecord {
        /// 1-based line number when the record came from a file
        line: Option<usize>,
        reason: String,
    },

    /// The backing store could not be reached or rejected an operation
    #[error("Store unavailable: {reason} ({acknowledged} events acknowledged)")]
    StoreUnavailable {
        reason: String,
        /// Events fully written before the failure (0 outside of ingestion)
        acknowledged: usize,
    },

    /// A width, page size or concurrency setting is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Reading a record source failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            line: None,
            reason: reason.into(),
        }
    }

    pub fn store_unavailable(reason: impl ToString) -> Self {
        Error::StoreUnavailable {
            reason: reason.to_string(),
            acknowledged: 0,
        }
    }

    /// Attach a source line number to a malformed record error
    pub fn at_line(self, line: usize) -> Self {
        match self {
            Error::MalformedRecord { reason, .. } => Error::MalformedRecord {
                line: Some(line),
                reason,
            },
            other => other,
        }
    }

    /// Record how many events were acknowledged before a store failure
    pub fn with_acknowledged(self, count: usize) -> Self {
        match self {
            Error::StoreUnavailable { reason, .. } => Error::StoreUnavailable {
                reason,
                acknowledged: count,
            },
            other => other,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::MalformedRecord { .. })
    }
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {}", l)).unwrap_or_default()
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::store_unavailable(err)
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
