//! Event parsing
//!
//! Turns raw input records into normalized [`Event`]s. Two input shapes are
//! accepted:
//!
//! - structured records carrying `time` and `link` fields (JSON objects)
//! - text lines of the form `<time>,<link>`, split on the first comma so
//!   that links may themselves contain commas
//!
//! A [`Parser`] can additionally fuse bucketing into parsing, producing
//! events whose `time` is already the bucket id.

use crate::bucket::BucketWidth;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A single link observed at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since the Unix epoch
    pub time: i64,
    pub link: String,
}

impl Event {
    pub fn new(time: i64, link: impl Into<String>) -> Self {
        Self {
            time,
            link: link.into(),
        }
    }
}

impl FromStr for Event {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_line(s)
    }
}

/// Time field of a structured record: a JSON integer or a numeric string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTime {
    Int(i64),
    Text(String),
}

impl From<i64> for RawTime {
    fn from(t: i64) -> Self {
        RawTime::Int(t)
    }
}

/// Unparsed input record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    Structured { time: RawTime, link: String },
    Line(String),
}

impl RawRecord {
    pub fn structured(time: i64, link: impl Into<String>) -> Self {
        RawRecord::Structured {
            time: RawTime::Int(time),
            link: link.into(),
        }
    }

    pub fn line(line: impl Into<String>) -> Self {
        RawRecord::Line(line.into())
    }
}

#[derive(Deserialize)]
struct StructuredFields {
    time: RawTime,
    link: String,
}

impl<'de> Deserialize<'de> for RawRecord {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fields = StructuredFields::deserialize(deserializer)?;
        Ok(RawRecord::Structured {
            time: fields.time,
            link: fields.link,
        })
    }
}

/// Parse a raw record into an event
pub fn parse(raw: &RawRecord) -> Result<Event> {
    match raw {
        RawRecord::Structured { time, link } => {
            let time = match time {
                RawTime::Int(t) => *t,
                RawTime::Text(s) => parse_time(s)?,
            };
            build_event(time, link)
        }
        RawRecord::Line(line) => parse_line(line),
    }
}

fn parse_line(line: &str) -> Result<Event> {
    let (time, link) = line
        .split_once(',')
        .ok_or_else(|| Error::malformed(format!("missing ',' separator in {:?}", line)))?;
    build_event(parse_time(time)?, link)
}

fn parse_time(s: &str) -> Result<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .map_err(|_| Error::malformed(format!("time {:?} is not an integer", s)))
}

fn build_event(time: i64, link: &str) -> Result<Event> {
    let link = link.trim();
    if link.is_empty() {
        return Err(Error::malformed("link is empty"));
    }
    Ok(Event::new(time, link))
}

/// Parser bound to a bucket width
///
/// `parse` returns events whose `time` has already been quantized to the
/// start of its bucket.
#[derive(Debug, Clone, Copy)]
pub struct Parser {
    width: BucketWidth,
}

impl Parser {
    pub fn new(width: i64) -> Result<Self> {
        Ok(Self {
            width: BucketWidth::new(width)?,
        })
    }

    pub fn with_width(width: BucketWidth) -> Self {
        Self { width }
    }

    pub fn width(&self) -> BucketWidth {
        self.width
    }

    pub fn parse(&self, raw: &RawRecord) -> Result<Event> {
        let event = parse(raw)?;
        Ok(Event {
            time: self.width.bucket(event.time)?,
            link: event.link,
        })
    }
}
