//! Error and Result types for cache operations.

use crate::series::SeriesId;
use crate::tree::NodeKind;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// The error type for cache, registry and protocol operations.
///
/// Every failing operation reports exactly one variant. Validation runs
/// before any mutation, so an `Err` always means the target structure is
/// unchanged.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A namespace, structure or instance identifier failed its character-class rule.
    #[error("Invalid {kind} identifier: '{id}'")]
    InvalidIdentifier {
        /// Kind of node the identifier was meant for.
        kind: NodeKind,
        /// The rejected identifier.
        id: String,
    },

    /// A node with the same name already exists under the parent.
    #[error("{kind} already exists: {name}")]
    AlreadyExists {
        /// Kind of the conflicting node.
        kind: NodeKind,
        /// Name of the conflicting node.
        name: String,
    },

    /// A node required by the operation does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Kind of the missing node.
        kind: NodeKind,
        /// Name of the missing node.
        name: String,
    },

    /// The attribute names of an instance key do not match the structure definition.
    #[error("Instance '{instance}' does not match structure definition '{definition}'")]
    StructureMismatch {
        /// The rejected instance key.
        instance: String,
        /// Canonical definition of the structure.
        definition: String,
    },

    /// A namespace/structure/instance path could not be resolved.
    #[error("No timeseries at path {0}")]
    PathNotFound(String),

    /// Paired timestamp and value lists have different lengths.
    #[error("Length mismatch: {timestamps} timestamps, {values} values")]
    LengthMismatch {
        /// Number of timestamps supplied.
        timestamps: usize,
        /// Number of values supplied.
        values: usize,
    },

    /// Insert-only operation hit timestamps that are already present.
    #[error("Points already exist: {}", .0.join(","))]
    PointsAlreadyExist(Vec<String>),

    /// Update or remove targeted timestamps that are not present.
    #[error("Points do not exist: {}", .0.join(","))]
    PointsDoNotExist(Vec<String>),

    /// A timestamp or tick specification is not in its expected text form.
    #[error("Invalid format: '{0}'")]
    InvalidFormat(String),

    /// A tick unit is recognised but not supported (month, year).
    #[error("Unsupported tick unit: '{0}'")]
    UnsupportedTick(String),

    /// A point falls outside the slots of a fixed grid.
    #[error("Point {timestamp} outside grid [{start}, {end}]")]
    PointOutOfGridRange {
        /// Timestamp of the rejected point.
        timestamp: String,
        /// First slot timestamp.
        start: String,
        /// Last slot timestamp.
        end: String,
    },

    /// The grid span divided by the tick needs more slots than allowed.
    #[error("Grid needs {slots} slots, limit is {max}")]
    GridTooLarge {
        /// Number of slots the span requires.
        slots: u64,
        /// Maximum number of slots a grid may hold.
        max: usize,
    },

    /// A `from`/`to` bound lies outside the span of the series.
    #[error("Range bound {bound} exceeds series bounds {span}")]
    RangeExceedsBounds {
        /// The offending bound.
        bound: String,
        /// Description of the series span.
        span: String,
    },

    /// The requested series ID is not registered.
    #[error("Unknown timeseries id: {0}")]
    UnknownId(SeriesId),

    /// Every registry ID has been handed out.
    #[error("Timeseries ids exhausted")]
    IdsExhausted,

    /// A wire command received the wrong number of arguments.
    #[error("Usage: {0}")]
    UsageError(String),

    /// A wire command verb is not recognised.
    #[error("Command not supported: {0}")]
    CommandNotSupported(String),

    /// A request line could not be read as text within its limits.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Server configuration was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A response could not be rendered.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl CacheError {
    /// Returns the error kind tag, independent of the message payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier { .. } => "InvalidIdentifier",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::NotFound { .. } => "NotFound",
            Self::StructureMismatch { .. } => "StructureMismatch",
            Self::PathNotFound(_) => "PathNotFound",
            Self::LengthMismatch { .. } => "LengthMismatch",
            Self::PointsAlreadyExist(_) => "PointsAlreadyExist",
            Self::PointsDoNotExist(_) => "PointsDoNotExist",
            Self::InvalidFormat(_) => "InvalidFormat",
            Self::UnsupportedTick(_) => "UnsupportedTick",
            Self::PointOutOfGridRange { .. } => "PointOutOfGridRange",
            Self::GridTooLarge { .. } => "GridTooLarge",
            Self::RangeExceedsBounds { .. } => "RangeExceedsBounds",
            Self::UnknownId(_) => "UnknownId",
            Self::IdsExhausted => "IdsExhausted",
            Self::UsageError(_) => "UsageError",
            Self::CommandNotSupported(_) => "CommandNotSupported",
            Self::MalformedRequest(_) => "MalformedRequest",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::SerializationError(_) => "SerializationError",
            Self::IoError(_) => "IoError",
        }
    }
}
