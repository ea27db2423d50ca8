//! # firebasin network
//!
//! Stream segment networks for post-wildfire debris-flow assessment.
//!
//! ## Modules
//!
//! - **flow**: D8 flow-direction model (TauDEM encoding)
//! - **traversal**: Upstream catchments, downstream paths, flow accumulation
//! - **graph**: Segment graph construction and max-length splitting
//! - **segments**: The `Segments` network manager and its topology queries
//! - **filter**: Keep/remove with flow-continuity preservation
//! - **basins**: Terminal basin raster, optionally on a worker pool
//! - **statistics**: Per-segment and per-catchment statistics
//! - **variables**: Area, burn ratio, relief, ruggedness, slope
//! - **export**: Segment, outlet and basin features
//!
//! ## Example
//!
//! ```ignore
//! use firebasin_network::prelude::*;
//!
//! let mut network = Segments::new(flow, &stream_mask, NetworkParams::default())?;
//! network.keep(&Selection::Ids(vec![1, 4, 7]), &FilterParams::default())?;
//! let summary = network.locate_basins(&BasinParams {
//!     mode: ProcessingMode::Parallel,
//!     ..Default::default()
//! })?;
//! let burn = network.burn_ratio(&burned, true)?;
//! ```

pub mod basins;
pub mod export;
pub mod filter;
pub mod flow;
pub mod graph;
pub mod segments;
pub mod statistics;
pub mod traversal;
pub mod units;
pub mod variables;

pub use basins::{BasinParams, BasinSummary, UnresolvedBasins};
pub use export::Properties;
pub use filter::{FilterMode, FilterParams, Selection};
pub use flow::FlowGrid;
pub use graph::Segment;
pub use segments::{NetworkParams, Segments};
pub use statistics::Statistic;
pub use units::LengthUnits;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::basins::{BasinParams, BasinSummary, UnresolvedBasins};
    pub use crate::filter::{FilterMode, FilterParams, Selection};
    pub use crate::segments::{NetworkParams, Segments};
    pub use crate::statistics::Statistic;
    pub use crate::units::LengthUnits;
    pub use firebasin_core::prelude::*;
    pub use firebasin_parallel::ProcessingMode;
}
