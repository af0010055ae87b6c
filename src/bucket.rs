//! Bucketizer
//!
//! Maps event timestamps onto fixed-width time buckets. A bucket is
//! identified by its start instant: `floor(time / width) * width`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a time bucket (its start, in seconds since the epoch)
pub type BucketId = i64;

/// Default bucket width: five minutes
pub const DEFAULT_WIDTH_SECS: i64 = 300;

/// Quantize `time` into the bucket of the given width.
///
/// Uses floor division, so negative timestamps land in the bucket that
/// starts at or before them. Near `i64::MIN` the floored start may not fit
/// in an `i64`; such times are rejected as malformed.
pub fn bucket(time: i64, width: i64) -> Result<BucketId> {
    BucketWidth::new(width)?.bucket(time)
}

/// A bucket width known to be positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct BucketWidth(i64);

impl BucketWidth {
    pub fn new(width: i64) -> Result<Self> {
        if width <= 0 {
            return Err(Error::InvalidConfiguration(format!(
                "bucket width must be positive, got {}",
                width
            )));
        }
        Ok(Self(width))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Start of the bucket containing `time`
    pub fn bucket(self, time: i64) -> Result<BucketId> {
        time.div_euclid(self.0).checked_mul(self.0).ok_or_else(|| {
            Error::malformed(format!(
                "time {} has no representable bucket of width {}",
                time, self.0
            ))
        })
    }
}

impl Default for BucketWidth {
    fn default() -> Self {
        Self(DEFAULT_WIDTH_SECS)
    }
}

impl TryFrom<i64> for BucketWidth {
    type Error = Error;

    fn try_from(width: i64) -> Result<Self> {
        Self::new(width)
    }
}

impl From<BucketWidth> for i64 {
    fn from(width: BucketWidth) -> Self {
        width.0
    }
}

impl fmt::Display for BucketWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
