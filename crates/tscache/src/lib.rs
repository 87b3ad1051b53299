//! Tscache - Alopex In-Memory Time Series Cache
//!
//! This crate provides an in-memory timeseries cache with two addressing
//! schemes and a one-request-per-connection line protocol server.
//!
//! # Components
//!
//! - [`CacheTree`]: namespace / structure / instance hierarchy with a
//!   timeseries at every instance leaf
//! - [`TimeseriesRegistry`]: flat, ID-addressed series store
//! - [`OrderedTimeseries`]: sorted point store with range queries
//! - [`FixedGridTimeseries`]: regular-interval densified view
//! - [`Server`] / [`Dispatcher`]: line protocol front end on a bounded worker pool
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_tscache::{CacheTree, TimeseriesRegistry};
//!
//! let mut tree: CacheTree<String> = CacheTree::new();
//! tree.add_namespace("infra")?;
//! tree.add_structure("infra", "link", "host,port")?;
//! tree.add_structure_instance("infra", "link", "port=1,host=a", None)?;
//!
//! let registry = TimeseriesRegistry::new();
//! let id = registry.allocate(&["2010-01-01T12:00:00.000+05:30"], vec!["UP".to_string()])?;
//! assert_eq!(registry.size(id)?, 1);
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod registry;
pub mod series;
pub mod server;
pub mod tree;

pub use config::{CliArgs, ServerConfig};
pub use error::{CacheError, Result};
pub use registry::{IdGenerator, TimeseriesRegistry};
pub use series::{
    FixedGridTimeseries, OrderedTimeseries, Points, SeriesId, TickSpec, TickUnit, Timestamp,
};
pub use server::{Dispatcher, Server};
pub use tree::{CacheTree, NodeKind, StructureDefinition};
