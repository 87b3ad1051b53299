//! Timeseries primitives shared by the cache tree and the ID registry.
//!
//! - [`timestamp`]: canonical text ⇄ epoch-millisecond codec
//! - [`OrderedTimeseries`]: sorted point store with range queries
//! - [`FixedGridTimeseries`]: regular-interval densified view

pub mod grid;
pub mod ordered;
pub mod timestamp;

pub use grid::{FixedGridTimeseries, TickSpec, TickUnit};
pub use ordered::{OrderedTimeseries, Points};
pub use timestamp::Timestamp;

/// Numeric handle of a registry-addressed series.
pub type SeriesId = u64;
