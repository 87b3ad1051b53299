//! Fixed-interval view of a sparse series.
//!
//! A [`FixedGridTimeseries`] spans `[min, max]` of its input timestamps in
//! steps of one [`TickSpec`]. Slots without a supplied point hold the
//! caller's null value.
//!
//! ```text
//! ticks:   |  0  |  1  |  2  |  3  |  4  |
//! points:   x           x                 x
//! slots:   [v0, null,  v2,  null, v4]
//! ```

use crate::error::{CacheError, Result};
use crate::series::ordered::OrderedTimeseries;
use crate::series::timestamp::{self, Timestamp};
use regex::Regex;
use std::sync::OnceLock;

/// Upper bound on the number of slots a single grid may allocate.
pub const MAX_GRID_SLOTS: usize = 10_000_000;

/// Supported tick units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickUnit {
    /// One second.
    Second,
    /// One minute.
    Minute,
    /// One hour.
    Hour,
    /// One day (86 400 seconds, no calendar adjustment).
    Day,
}

impl TickUnit {
    /// Returns the unit length in milliseconds.
    pub fn as_millis(self) -> i64 {
        match self {
            Self::Second => 1_000,
            Self::Minute => 60_000,
            Self::Hour => 3_600_000,
            Self::Day => 86_400_000,
        }
    }
}

fn tick_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| Regex::new(r"^(\d+)([A-Za-z]+)$").expect("static tick pattern"))
}

/// A tick interval written as `<N><unit>`, e.g. `15m` or `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSpec {
    count: i64,
    unit: TickUnit,
}

impl TickSpec {
    /// Creates a tick of `count` units.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidFormat` for a zero count or an interval
    /// that overflows 64-bit milliseconds.
    pub fn new(count: i64, unit: TickUnit) -> Result<Self> {
        let valid = count > 0 && count.checked_mul(unit.as_millis()).is_some();
        if !valid {
            return Err(CacheError::InvalidFormat(format!("{count} x {unit:?}")));
        }
        Ok(Self { count, unit })
    }

    /// Parses a tick specification.
    ///
    /// Units: `s|sec|second(s)`, `m|min|minute(s)`, `h|hr|hour(s)`, `d|day(s)`.
    /// `M` is month, not minute.
    ///
    /// # Errors
    ///
    /// - `CacheError::UnsupportedTick` for month and year units
    /// - `CacheError::InvalidFormat` for anything else that is not a valid tick
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = || CacheError::InvalidFormat(spec.to_string());

        let captures = tick_shape().captures(spec).ok_or_else(invalid)?;
        let count: i64 = captures[1].parse().map_err(|_| invalid())?;
        let unit_text = &captures[2];

        if unit_text == "M" {
            return Err(CacheError::UnsupportedTick(spec.to_string()));
        }
        let unit = match unit_text.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => TickUnit::Second,
            "m" | "min" | "mins" | "minute" | "minutes" => TickUnit::Minute,
            "h" | "hr" | "hrs" | "hour" | "hours" => TickUnit::Hour,
            "d" | "day" | "days" => TickUnit::Day,
            "mo" | "mon" | "month" | "months" | "y" | "yr" | "yrs" | "year" | "years" => {
                return Err(CacheError::UnsupportedTick(spec.to_string()))
            }
            _ => return Err(invalid()),
        };

        Self::new(count, unit).map_err(|_| invalid())
    }

    /// Returns the tick length in milliseconds.
    pub fn millis(&self) -> i64 {
        self.count * self.unit.as_millis()
    }

    /// Returns the unit of this tick.
    pub fn unit(&self) -> TickUnit {
        self.unit
    }

    /// Returns how many units make up one tick.
    pub fn count(&self) -> i64 {
        self.count
    }
}

/// A series densified onto a regular time grid.
#[derive(Debug, Clone)]
pub struct FixedGridTimeseries<V> {
    start: Option<Timestamp>,
    tick: TickSpec,
    null_value: V,
    slots: Vec<V>,
}

impl<V: Clone> FixedGridTimeseries<V> {
    /// Builds a grid from paired timestamp texts and values.
    ///
    /// # Errors
    ///
    /// - `CacheError::LengthMismatch` if the lists differ in length
    /// - `CacheError::InvalidFormat` for a malformed timestamp
    /// - `CacheError::InvalidFormat` / `CacheError::UnsupportedTick` for a bad tick
    /// - `CacheError::GridTooLarge` if the span needs more than [`MAX_GRID_SLOTS`]
    ///   or the last slot would fall outside 64-bit milliseconds
    pub fn new<S: AsRef<str>>(
        timestamps: &[S],
        values: Vec<V>,
        tick_spec: &str,
        null_value: V,
    ) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(CacheError::LengthMismatch {
                timestamps: timestamps.len(),
                values: values.len(),
            });
        }
        let parsed = timestamp::parse_many(timestamps)?;
        let tick = TickSpec::parse(tick_spec)?;

        Self::from_points(parsed.into_iter().zip(values).collect(), tick, null_value)
    }

    /// Densifies an existing series.
    pub fn from_series(
        series: &OrderedTimeseries<V>,
        tick: TickSpec,
        null_value: V,
    ) -> Result<Self> {
        Self::from_points(series.points(), tick, null_value)
    }

    /// Builds a grid over `[min, max]` of the given points.
    ///
    /// When two points fall in the same slot the later one in `points` wins.
    pub fn from_points(points: Vec<(Timestamp, V)>, tick: TickSpec, null_value: V) -> Result<Self> {
        let start = points.iter().map(|(ts, _)| *ts).min();
        let end = points.iter().map(|(ts, _)| *ts).max();

        let slot_count = match (start, end) {
            (Some(start), Some(end)) => slot_count(start, end, tick)?,
            _ => 0,
        };

        let mut grid = Self {
            start,
            tick,
            slots: vec![null_value.clone(); slot_count],
            null_value,
        };
        for (ts, value) in points {
            grid.set_point(ts, value)?;
        }
        Ok(grid)
    }

    /// Overwrites the slot containing `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::PointOutOfGridRange` if the timestamp falls
    /// before the first slot or after the last one.
    pub fn set_point(&mut self, timestamp: Timestamp, value: V) -> Result<()> {
        let index = self
            .slot_index(timestamp)
            .ok_or_else(|| self.out_of_range(timestamp))?;
        self.slots[index] = value;
        Ok(())
    }

    fn out_of_range(&self, timestamp: Timestamp) -> CacheError {
        let (start, end) = match (self.start(), self.end()) {
            (Some(start), Some(end)) => (start.format(), end.format()),
            _ => ("(empty)".to_string(), "(empty)".to_string()),
        };
        CacheError::PointOutOfGridRange {
            timestamp: timestamp.format(),
            start,
            end,
        }
    }
}

impl<V> FixedGridTimeseries<V> {
    /// Returns the slot index for `timestamp`, if it lies on the grid.
    pub fn slot_index(&self, timestamp: Timestamp) -> Option<usize> {
        let start = self.start?;
        let offset = timestamp.millis().checked_sub(start.millis())?;
        if offset < 0 {
            return None;
        }
        let index = usize::try_from(offset / self.tick.millis()).ok()?;
        (index < self.slots.len()).then_some(index)
    }

    /// Returns the timestamp at which slot `index` begins.
    pub fn slot_timestamp(&self, index: usize) -> Option<Timestamp> {
        let start = self.start?;
        if index >= self.slots.len() {
            return None;
        }
        let millis = i64::try_from(index)
            .ok()?
            .checked_mul(self.tick.millis())?
            .checked_add(start.millis())?;
        Some(Timestamp::with_offset(millis, start.offset()))
    }

    /// Returns the value of the slot containing `timestamp`.
    pub fn get(&self, timestamp: Timestamp) -> Option<&V> {
        self.slot_index(timestamp).map(|index| &self.slots[index])
    }

    /// Returns the timestamp of the first slot.
    pub fn start(&self) -> Option<Timestamp> {
        self.start
    }

    /// Returns the timestamp of the last slot.
    pub fn end(&self) -> Option<Timestamp> {
        self.slots
            .len()
            .checked_sub(1)
            .and_then(|last| self.slot_timestamp(last))
    }

    /// Returns the tick interval.
    pub fn tick(&self) -> TickSpec {
        self.tick
    }

    /// Returns the sentinel stored in empty slots.
    pub fn null_value(&self) -> &V {
        &self.null_value
    }

    /// Returns all slots in time order.
    pub fn slots(&self) -> &[V] {
        &self.slots
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the grid has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over `(slot timestamp, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &V)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(index, value)| Some((self.slot_timestamp(index)?, value)))
    }
}

impl<V: PartialEq> FixedGridTimeseries<V> {
    /// Returns true if slot `index` still holds the null value.
    pub fn is_null_at(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|value| *value == self.null_value)
    }
}

/// Slot count for `[start, end]`: ceil((end - start) / tick) + 1.
///
/// Every slot timestamp, including the last one, must fit in i64 millis.
fn slot_count(start: Timestamp, end: Timestamp, tick: TickSpec) -> Result<usize> {
    let span = end.millis().abs_diff(start.millis());
    let tick_millis = tick.millis().unsigned_abs();
    let slots = span.div_ceil(tick_millis).saturating_add(1);
    let too_large = || CacheError::GridTooLarge {
        slots,
        max: MAX_GRID_SLOTS,
    };

    let count = usize::try_from(slots).map_err(|_| too_large())?;
    if count > MAX_GRID_SLOTS {
        return Err(too_large());
    }
    i64::try_from(slots - 1)
        .ok()
        .and_then(|last| last.checked_mul(tick.millis()))
        .and_then(|offset| offset.checked_add(start.millis()))
        .ok_or_else(too_large)?;
    Ok(count)
}
