//! Canonical timestamp text codec.
//!
//! Timestamps travel as `YYYY-MM-DDTHH:MM:SS.mmm+HH:MM` and are stored as
//! signed epoch milliseconds together with the offset they were written in,
//! so formatting a parsed value reproduces its input text exactly.

use crate::error::{CacheError, Result};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

/// `chrono` format string of the canonical text form.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// chrono accepts a missing or variable-width fraction for `%.3f`; the wire
/// form does not, so the shape is checked before parsing.
fn canonical_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}[+-]\d{2}:\d{2}$")
            .expect("static timestamp pattern")
    })
}

/// A point in time with millisecond precision.
///
/// Equality, ordering and hashing consider only the epoch-millisecond value;
/// the offset is kept for formatting.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    millis: i64,
    offset: FixedOffset,
}

impl Timestamp {
    /// Creates a UTC timestamp from epoch milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self {
            millis,
            offset: Utc.fix(),
        }
    }

    /// Creates a timestamp that formats in the given offset.
    pub fn with_offset(millis: i64, offset: FixedOffset) -> Self {
        Self { millis, offset }
    }

    /// Returns the epoch-millisecond value.
    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// Returns the offset used when formatting.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Formats the timestamp in canonical text form.
    ///
    /// Values outside chrono's representable range fall back to the raw
    /// millisecond count; `parse` never produces such values.
    pub fn format(&self) -> String {
        match DateTime::<Utc>::from_timestamp_millis(self.millis) {
            Some(utc) => utc
                .with_timezone(&self.offset)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            None => self.millis.to_string(),
        }
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.millis == other.millis
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis.cmp(&other.millis)
    }
}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.millis.hash(state);
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for Timestamp {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

/// Parses a timestamp from its canonical text form.
///
/// # Errors
///
/// Returns `CacheError::InvalidFormat` for any other form, including
/// `Z` suffixes, missing milliseconds and out-of-range calendar fields.
pub fn parse(text: &str) -> Result<Timestamp> {
    if !canonical_shape().is_match(text) {
        return Err(CacheError::InvalidFormat(text.to_string()));
    }

    let parsed = DateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|_| CacheError::InvalidFormat(text.to_string()))?;

    Ok(Timestamp {
        millis: parsed.timestamp_millis(),
        offset: *parsed.offset(),
    })
}

/// Parses every element, failing on the first malformed one.
pub fn parse_many<S: AsRef<str>>(texts: &[S]) -> Result<Vec<Timestamp>> {
    texts.iter().map(|text| parse(text.as_ref())).collect()
}
