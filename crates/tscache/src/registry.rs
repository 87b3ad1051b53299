//! ID-addressed timeseries registry.
//!
//! Series live in a flat map keyed by a monotonically increasing numeric ID.
//! The map lock is held only long enough to clone the series handle; reads
//! and writes then lock that one series, so callers working on different IDs
//! do not contend.

use crate::error::{CacheError, Result};
use crate::series::{
    FixedGridTimeseries, OrderedTimeseries, Points, SeriesId, TickSpec, Timestamp,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// First ID handed out by a registry built with [`TimeseriesRegistry::new`].
pub const DEFAULT_ID_ORIGIN: SeriesId = 1;

/// Thread-safe monotonic ID source.
///
/// # Examples
/// ```rust,ignore
/// use alopex_tscache::registry::IdGenerator;
///
/// let ids = IdGenerator::starting_at(1);
/// assert_eq!(ids.next_id()?, 1);
/// assert_eq!(ids.next_id()?, 2);
/// ```
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::starting_at(DEFAULT_ID_ORIGIN)
    }
}

impl IdGenerator {
    /// Creates a generator whose first ID is `origin`.
    pub fn starting_at(origin: SeriesId) -> Self {
        Self {
            next: AtomicU64::new(origin),
        }
    }

    /// Takes the next ID. Every call returns a distinct, strictly larger value.
    ///
    /// `SeriesId::MAX` is never handed out; it marks the end of the ID space.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::IdsExhausted` once every ID has been taken.
    pub fn next_id(&self) -> Result<SeriesId> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| CacheError::IdsExhausted)
    }

    /// Returns the ID the next call to [`IdGenerator::next_id`] will hand out.
    pub fn peek(&self) -> SeriesId {
        self.next.load(Ordering::SeqCst)
    }
}

type SharedSeries<V> = Arc<RwLock<OrderedTimeseries<V>>>;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|err| err.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|err| err.into_inner())
}

/// Registry of anonymous timeseries addressed by [`SeriesId`].
#[derive(Debug)]
pub struct TimeseriesRegistry<V> {
    ids: IdGenerator,
    series: RwLock<HashMap<SeriesId, SharedSeries<V>>>,
}

impl<V> Default for TimeseriesRegistry<V> {
    fn default() -> Self {
        Self::with_origin(DEFAULT_ID_ORIGIN)
    }
}

impl<V> TimeseriesRegistry<V> {
    /// Creates an empty registry starting at [`DEFAULT_ID_ORIGIN`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry whose first ID is `origin`.
    pub fn with_origin(origin: SeriesId) -> Self {
        Self {
            ids: IdGenerator::starting_at(origin),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Returns true if `id` is registered.
    pub fn contains(&self, id: SeriesId) -> bool {
        read(&self.series).contains_key(&id)
    }

    /// Returns the number of registered series.
    pub fn len(&self) -> usize {
        read(&self.series).len()
    }

    /// Returns true if no series is registered.
    pub fn is_empty(&self) -> bool {
        read(&self.series).is_empty()
    }

    /// Returns the ID the next successful allocation will receive.
    pub fn next_id(&self) -> SeriesId {
        self.ids.peek()
    }

    /// Drops a series. Its ID is never reused.
    pub fn deallocate(&self, id: SeriesId) -> Result<()> {
        write(&self.series)
            .remove(&id)
            .ok_or(CacheError::UnknownId(id))?;
        debug!("Deallocated timeseries {}", id);
        Ok(())
    }

    /// Returns the number of points in a series.
    pub fn size(&self, id: SeriesId) -> Result<usize> {
        self.with_series(id, |series| Ok(series.size()))
    }

    fn handle(&self, id: SeriesId) -> Result<SharedSeries<V>> {
        read(&self.series)
            .get(&id)
            .cloned()
            .ok_or(CacheError::UnknownId(id))
    }

    fn with_series<T>(
        &self,
        id: SeriesId,
        f: impl FnOnce(&OrderedTimeseries<V>) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(id)?;
        let series = read(&handle);
        f(&series)
    }

    fn with_series_mut<T>(
        &self,
        id: SeriesId,
        f: impl FnOnce(&mut OrderedTimeseries<V>) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(id)?;
        let mut series = write(&handle);
        f(&mut series)
    }
}

impl<V: Clone> TimeseriesRegistry<V> {
    /// Registers a new series and returns its ID.
    ///
    /// The series is built before an ID is taken, so a rejected batch does
    /// not consume an ID.
    ///
    /// # Errors
    ///
    /// - `CacheError::LengthMismatch` if the lists differ in length
    /// - `CacheError::InvalidFormat` if any timestamp is malformed
    /// - `CacheError::IdsExhausted` if no ID is left
    ///
    /// # Examples
    /// ```rust,ignore
    /// use alopex_tscache::registry::TimeseriesRegistry;
    ///
    /// let registry = TimeseriesRegistry::new();
    /// let id = registry.allocate(&["2010-01-01T12:00:00.000+05:30"], vec!["UP"])?;
    /// assert_eq!(registry.size(id)?, 1);
    /// ```
    pub fn allocate<S: AsRef<str>>(&self, timestamps: &[S], values: Vec<V>) -> Result<SeriesId> {
        let series = OrderedTimeseries::new(timestamps, values)?;
        let points = series.size();

        let mut map = write(&self.series);
        let id = self.ids.next_id()?;
        map.insert(id, Arc::new(RwLock::new(series)));
        drop(map);

        debug!("Allocated timeseries {} with {} points", id, points);
        Ok(id)
    }

    /// Inserts new points into a series. Never overwrites.
    pub fn add_points<S: AsRef<str>>(
        &self,
        id: SeriesId,
        timestamps: &[S],
        values: Vec<V>,
    ) -> Result<()> {
        self.with_series_mut(id, |series| series.add_points(timestamps, values))?;
        debug!("Added {} points to timeseries {}", timestamps.len(), id);
        Ok(())
    }

    /// Replaces the values of existing points.
    pub fn modify_points<S: AsRef<str>>(
        &self,
        id: SeriesId,
        timestamps: &[S],
        values: Vec<V>,
    ) -> Result<()> {
        self.with_series_mut(id, |series| series.update_points(timestamps, values))?;
        debug!("Modified {} points in timeseries {}", timestamps.len(), id);
        Ok(())
    }

    /// Removes existing points.
    pub fn remove_points<S: AsRef<str>>(&self, id: SeriesId, timestamps: &[S]) -> Result<()> {
        self.with_series_mut(id, |series| series.remove_points(timestamps))?;
        debug!("Removed {} points from timeseries {}", timestamps.len(), id);
        Ok(())
    }

    /// Returns every point of a series.
    pub fn get(&self, id: SeriesId) -> Result<Points<V>> {
        self.with_series(id, |series| Ok(series.points()))
    }

    /// Returns the points in `[from, last]`.
    pub fn get_from(&self, id: SeriesId, from: Timestamp) -> Result<Points<V>> {
        self.with_series(id, |series| series.range_from(from))
    }

    /// Returns the points in `[first, to]`.
    pub fn get_to(&self, id: SeriesId, to: Timestamp) -> Result<Points<V>> {
        self.with_series(id, |series| series.range_to(to))
    }

    /// Returns the points in `[from, to]`.
    pub fn get_between(&self, id: SeriesId, from: Timestamp, to: Timestamp) -> Result<Points<V>> {
        self.with_series(id, |series| Ok(series.range_between(from, to)))
    }

    /// Densifies a series onto a fixed grid.
    pub fn grid(&self, id: SeriesId, tick: &str, null_value: V) -> Result<FixedGridTimeseries<V>> {
        self.with_series(id, |series| {
            let tick = TickSpec::parse(tick)?;
            FixedGridTimeseries::from_series(series, tick, null_value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::timestamp::parse;
    use std::thread;

    const T1: &str = "2010-01-01T12:00:00.000+05:30";
    const T2: &str = "2010-01-02T12:00:00.000+05:30";
    const T3: &str = "2010-01-03T12:00:00.000+05:30";

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_id_generator_monotonic() {
        let ids = IdGenerator::starting_at(10);
        assert_eq!(ids.peek(), 10);
        assert_eq!(ids.next_id().unwrap(), 10);
        assert_eq!(ids.next_id().unwrap(), 11);
        assert_eq!(ids.peek(), 12);
    }

    #[test]
    fn test_id_generator_stops_at_max() {
        let ids = IdGenerator::starting_at(SeriesId::MAX - 1);
        assert_eq!(ids.next_id().unwrap(), SeriesId::MAX - 1);
        assert!(matches!(ids.next_id(), Err(CacheError::IdsExhausted)));
        assert!(matches!(ids.next_id(), Err(CacheError::IdsExhausted)));
        assert_eq!(ids.peek(), SeriesId::MAX);
    }

    #[test]
    fn test_exhausted_registry_keeps_live_series() {
        let registry: TimeseriesRegistry<String> =
            TimeseriesRegistry::with_origin(SeriesId::MAX - 1);
        let last = registry.allocate(&[T1], strings(&["UP"])).unwrap();
        assert_eq!(last, SeriesId::MAX - 1);

        let result = registry.allocate(&[T2], strings(&["DOWN"]));
        assert!(matches!(result, Err(CacheError::IdsExhausted)));
        assert_eq!(registry.len(), 1);
        let points = registry.get(last).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].1, "UP");
    }

    #[test]
    fn test_sequential_allocations() {
        let registry: TimeseriesRegistry<String> = TimeseriesRegistry::new();
        let id1 = registry.allocate(&[T1], strings(&["UP"])).unwrap();
        let id2 = registry.allocate(&[T2], strings(&["DOWN"])).unwrap();

        assert_eq!(id1, DEFAULT_ID_ORIGIN);
        assert_eq!(id2, id1 + 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_failed_allocation_keeps_id() {
        let registry: TimeseriesRegistry<String> = TimeseriesRegistry::new();
        let before = registry.next_id();

        let result = registry.allocate(&[T1, T2], strings(&["UP"]));
        assert!(matches!(result, Err(CacheError::LengthMismatch { .. })));
        let result = registry.allocate(&["garbage"], strings(&["UP"]));
        assert!(matches!(result, Err(CacheError::InvalidFormat(_))));

        assert_eq!(registry.next_id(), before);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_id() {
        let registry: TimeseriesRegistry<String> = TimeseriesRegistry::new();
        assert!(matches!(registry.get(42), Err(CacheError::UnknownId(42))));
        assert!(matches!(registry.size(42), Err(CacheError::UnknownId(42))));
        assert!(matches!(
            registry.add_points(42, &[T1], strings(&["UP"])),
            Err(CacheError::UnknownId(42))
        ));
        assert!(matches!(
            registry.deallocate(42),
            Err(CacheError::UnknownId(42))
        ));
    }

    #[test]
    fn test_point_mutations() {
        let registry: TimeseriesRegistry<String> = TimeseriesRegistry::new();
        let id = registry.allocate(&[T1], strings(&["UP"])).unwrap();

        registry.add_points(id, &[T2, T3], strings(&["DOWN", "UP"])).unwrap();
        assert_eq!(registry.size(id).unwrap(), 3);

        assert!(matches!(
            registry.add_points(id, &[T1], strings(&["X"])),
            Err(CacheError::PointsAlreadyExist(_))
        ));

        registry.modify_points(id, &[T2], strings(&["FLAP"])).unwrap();
        let points = registry.get(id).unwrap();
        assert_eq!(points[1].1, "FLAP");

        registry.remove_points(id, &[T1]).unwrap();
        assert_eq!(registry.size(id).unwrap(), 2);
        assert!(matches!(
            registry.remove_points(id, &[T1]),
            Err(CacheError::PointsDoNotExist(_))
        ));
    }

    #[test]
    fn test_range_reads() {
        let registry: TimeseriesRegistry<String> = TimeseriesRegistry::new();
        let id = registry
            .allocate(&[T1, T2, T3], strings(&["a", "b", "c"]))
            .unwrap();
        let t2 = parse(T2).unwrap();

        assert_eq!(registry.get_from(id, t2).unwrap().len(), 2);
        assert_eq!(registry.get_to(id, t2).unwrap().len(), 2);
        assert_eq!(registry.get_between(id, t2, t2).unwrap().len(), 1);
    }

    #[test]
    fn test_deallocate() {
        let registry: TimeseriesRegistry<String> = TimeseriesRegistry::new();
        let id = registry.allocate(&[T1], strings(&["UP"])).unwrap();

        registry.deallocate(id).unwrap();
        assert!(!registry.contains(id));

        let next = registry.allocate(&[T1], strings(&["UP"])).unwrap();
        assert_ne!(next, id);
    }

    #[test]
    fn test_grid() {
        let registry: TimeseriesRegistry<String> = TimeseriesRegistry::new();
        let id = registry
            .allocate(&[T1, T3], strings(&["UP", "DOWN"]))
            .unwrap();

        let grid = registry.grid(id, "1d", "null".to_string()).unwrap();
        assert_eq!(grid.slots(), strings(&["UP", "null", "DOWN"]).as_slice());
        assert!(matches!(
            registry.grid(id, "1M", String::new()),
            Err(CacheError::UnsupportedTick(_))
        ));
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let registry: Arc<TimeseriesRegistry<String>> = Arc::new(TimeseriesRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..50)
                        .map(|_| registry.allocate(&[T1], strings(&["UP"])).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<SeriesId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 400);
        assert_eq!(registry.len(), 400);
    }
}
