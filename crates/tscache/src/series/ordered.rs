//! OrderedTimeseries - sorted timestamp to value store.
//!
//! A series holds at most one value per timestamp and iterates in ascending
//! timestamp order. Batch mutations validate every point before touching the
//! map, so a rejected batch leaves the series exactly as it was.

use crate::error::{CacheError, Result};
use crate::series::timestamp::{self, Timestamp};
use std::collections::BTreeMap;
use std::ops::RangeBounds;

/// An owned, ascending sequence of points returned by range queries.
pub type Points<V> = Vec<(Timestamp, V)>;

/// Sorted associative container keyed by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedTimeseries<V> {
    points: BTreeMap<Timestamp, V>,
}

impl<V> Default for OrderedTimeseries<V> {
    fn default() -> Self {
        Self {
            points: BTreeMap::new(),
        }
    }
}

/// Pairs parsed timestamps with values after checking both lists line up.
fn parse_batch<S: AsRef<str>, V>(timestamps: &[S], values: Vec<V>) -> Result<Points<V>> {
    if timestamps.len() != values.len() {
        return Err(CacheError::LengthMismatch {
            timestamps: timestamps.len(),
            values: values.len(),
        });
    }

    let parsed = timestamp::parse_many(timestamps)?;
    Ok(parsed.into_iter().zip(values).collect())
}

impl<V: Clone> OrderedTimeseries<V> {
    /// Builds a series from paired timestamp texts and values.
    ///
    /// Duplicate timestamps are allowed; the later value wins.
    ///
    /// # Errors
    ///
    /// - `CacheError::LengthMismatch` if the lists differ in length
    /// - `CacheError::InvalidFormat` if any timestamp is malformed
    pub fn new<S: AsRef<str>>(timestamps: &[S], values: Vec<V>) -> Result<Self> {
        let batch = parse_batch(timestamps, values)?;
        Ok(Self::from_points(batch))
    }

    /// Builds a series from already parsed points. Later duplicates win.
    pub fn from_points(points: impl IntoIterator<Item = (Timestamp, V)>) -> Self {
        let mut series = Self::default();
        for (ts, value) in points {
            series.points.insert(ts, value);
        }
        series
    }

    /// Inserts new points. This operation never overwrites.
    ///
    /// # Errors
    ///
    /// - `CacheError::LengthMismatch` / `CacheError::InvalidFormat` for a bad batch
    /// - `CacheError::PointsAlreadyExist` listing every timestamp already present
    pub fn add_points<S: AsRef<str>>(&mut self, timestamps: &[S], values: Vec<V>) -> Result<()> {
        let batch = parse_batch(timestamps, values)?;

        let existing: Vec<String> = batch
            .iter()
            .filter(|(ts, _)| self.points.contains_key(ts))
            .map(|(ts, _)| ts.format())
            .collect();
        if !existing.is_empty() {
            return Err(CacheError::PointsAlreadyExist(existing));
        }

        self.points.extend(batch);
        Ok(())
    }

    /// Replaces the values of existing points.
    ///
    /// # Errors
    ///
    /// - `CacheError::LengthMismatch` / `CacheError::InvalidFormat` for a bad batch
    /// - `CacheError::PointsDoNotExist` listing every timestamp not present
    pub fn update_points<S: AsRef<str>>(
        &mut self,
        timestamps: &[S],
        values: Vec<V>,
    ) -> Result<()> {
        let batch = parse_batch(timestamps, values)?;
        self.ensure_present(batch.iter().map(|(ts, _)| ts))?;

        for (ts, value) in batch {
            if let Some(slot) = self.points.get_mut(&ts) {
                *slot = value;
            }
        }
        Ok(())
    }

    /// Removes the given points.
    ///
    /// # Errors
    ///
    /// - `CacheError::InvalidFormat` for a malformed timestamp
    /// - `CacheError::PointsDoNotExist` listing every timestamp not present
    pub fn remove_points<S: AsRef<str>>(&mut self, timestamps: &[S]) -> Result<()> {
        let parsed = timestamp::parse_many(timestamps)?;
        self.ensure_present(parsed.iter())?;

        for ts in &parsed {
            self.points.remove(ts);
        }
        Ok(())
    }

    fn ensure_present<'a>(&self, timestamps: impl Iterator<Item = &'a Timestamp>) -> Result<()> {
        let missing: Vec<String> = timestamps
            .filter(|ts| !self.points.contains_key(*ts))
            .map(Timestamp::format)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CacheError::PointsDoNotExist(missing))
        }
    }

    fn collect_range(&self, range: impl RangeBounds<Timestamp>) -> Points<V> {
        self.points
            .range(range)
            .map(|(ts, value)| (*ts, value.clone()))
            .collect()
    }

    /// Returns the points in the closed interval `[from, to]`.
    ///
    /// An interval with no stored keys, or with `from > to`, yields an empty result.
    pub fn range_between(&self, from: Timestamp, to: Timestamp) -> Points<V> {
        if from > to {
            return Vec::new();
        }
        self.collect_range(from..=to)
    }

    /// Returns the points in `[from, last]`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::RangeExceedsBounds` if `from` is after the last
    /// stored timestamp, or if the series is empty.
    pub fn range_from(&self, from: Timestamp) -> Result<Points<V>> {
        match self.last() {
            Some(last) if from <= last => Ok(self.collect_range(from..)),
            _ => Err(self.exceeds_bounds(from)),
        }
    }

    /// Returns the points in `[first, to]`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::RangeExceedsBounds` if `to` is before the first
    /// stored timestamp, or if the series is empty.
    pub fn range_to(&self, to: Timestamp) -> Result<Points<V>> {
        match self.first() {
            Some(first) if to >= first => Ok(self.collect_range(..=to)),
            _ => Err(self.exceeds_bounds(to)),
        }
    }

    fn exceeds_bounds(&self, bound: Timestamp) -> CacheError {
        let span = match self.span() {
            Some((first, last)) => format!("[{}, {}]", first, last),
            None => "(empty)".to_string(),
        };
        CacheError::RangeExceedsBounds {
            bound: bound.format(),
            span,
        }
    }

    /// Returns every point in ascending order.
    pub fn points(&self) -> Points<V> {
        self.collect_range(..)
    }
}

impl<V> OrderedTimeseries<V> {
    /// Returns the number of stored points.
    pub fn size(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the series holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the value stored at `timestamp`, if any.
    pub fn get_one(&self, timestamp: &Timestamp) -> Option<&V> {
        self.points.get(timestamp)
    }

    /// Returns the earliest stored timestamp.
    pub fn first(&self) -> Option<Timestamp> {
        self.points.keys().next().copied()
    }

    /// Returns the latest stored timestamp.
    pub fn last(&self) -> Option<Timestamp> {
        self.points.keys().next_back().copied()
    }

    /// Returns `(first, last)` for a non-empty series.
    pub fn span(&self) -> Option<(Timestamp, Timestamp)> {
        Some((self.first()?, self.last()?))
    }

    /// Iterates over all points in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (&Timestamp, &V)> {
        self.points.iter()
    }
}
