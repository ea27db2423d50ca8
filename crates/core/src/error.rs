//! Error types for firebasin

use thiserror::Error;

/// Main error type for firebasin operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot shape {len} values into a {rows}x{cols} raster")]
    InvalidDimensions { rows: usize, cols: usize, len: usize },

    #[error("Pixel ({row}, {col}) is outside a {rows}x{cols} raster")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("The {name} raster has shape {actual:?}, but the stream network grid is {expected:?}")]
    SizeMismatch {
        name: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("The {name} raster is not aligned with the stream network grid")]
    TransformMismatch { name: &'static str },

    #[error("The {name} raster is in {actual}, but the stream network uses {expected}")]
    CrsMismatch {
        name: &'static str,
        expected: String,
        actual: String,
    },

    #[error("The {name} raster must have an affine transform")]
    MissingTransform { name: &'static str },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Segment not found: {0}")]
    SegmentNotFound(u32),

    #[error("Unknown statistic: {0}")]
    UnknownStatistic(String),

    #[error("Selection mask has {actual} elements, but the network has {expected} segments")]
    SelectionLength { expected: usize, actual: usize },

    #[error("Property '{name}' has {actual} values, but {expected} are required")]
    PropertyLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Could not resolve the catchment basins of terminal segments {0:?}")]
    UnresolvedBasins(Vec<u32>),

    #[error("Stream network consistency error: {0}")]
    Consistency(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

/// Result type alias for firebasin operations
pub type Result<T> = std::result::Result<T, Error>;
