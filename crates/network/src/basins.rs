//! Terminal outlet basins
//!
//! Labels every pixel draining to a terminal segment's outlet with that
//! terminal's ID. When the basins of two local networks overlap (one network
//! drains into the other across non-stream pixels), the downstream terminal
//! wins: basins are stamped from the smallest catchment to the largest, and
//! a nested catchment is always strictly smaller than the one containing it.

use crate::flow::FlowGrid;
use crate::segments::Segments;
use crate::traversal::{catchment, is_resolvable};
use firebasin_core::raster::Raster;
use firebasin_core::{Error, Result};
use firebasin_parallel::{ParallelStrategy, ProcessingMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do with terminal segments whose catchment cannot be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedBasins {
    /// Leave their basins empty
    Ignore,
    /// Leave their basins empty and log a warning listing them
    #[default]
    Warn,
    /// Fail with [`Error::UnresolvedBasins`] without caching anything
    Fail,
}

/// Parameters for basin location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BasinParams {
    /// Sequential, or one task per local network on a worker pool
    pub mode: ProcessingMode,
    pub on_unresolved: UnresolvedBasins,
}

/// Outcome of a basin location run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasinSummary {
    /// Number of terminal segments processed
    pub terminals: usize,
    /// Terminal IDs whose basin could not be resolved and is empty
    pub empty: Vec<u32>,
}

/// Catchment of one terminal outlet, or `None` if its flow path loops
fn terminal_basin(flow: &FlowGrid, outlet: (usize, usize)) -> Option<Vec<usize>> {
    if !is_resolvable(flow, outlet) {
        return None;
    }
    Some(catchment(flow, outlet))
}

impl Segments {
    /// Build and cache the terminal basin raster.
    ///
    /// Replaces any previously cached raster. Each local network is an
    /// independent task; with a parallel `mode` the tasks run on a dedicated
    /// worker pool and only their pixel lists come back for merging.
    pub fn locate_basins(&mut self, params: &BasinParams) -> Result<BasinSummary> {
        // Precedence order: smallest catchment first, ties by ID
        let mut tasks: Vec<(u32, u64, (usize, usize))> = self
            .segments
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| (s.id, s.npixels, s.outlet()))
            .collect();
        tasks.sort_by_key(|&(id, npixels, _)| (npixels, id));

        debug!(terminals = tasks.len(), mode = ?params.mode, "locating terminal basins");

        let flow: &FlowGrid = &self.flow;
        let outlets: Vec<(u32, (usize, usize))> = tasks.iter().map(|&(id, _, outlet)| (id, outlet)).collect();
        let basins = params
            .mode
            .par_map(outlets, |(id, outlet)| (id, terminal_basin(flow, outlet)))?;

        let empty: Vec<u32> = basins
            .iter()
            .filter(|(_, pixels)| pixels.is_none())
            .map(|(id, _)| *id)
            .collect();
        if !empty.is_empty() {
            match params.on_unresolved {
                UnresolvedBasins::Fail => return Err(Error::UnresolvedBasins(empty)),
                UnresolvedBasins::Warn => {
                    warn!(terminals = ?empty, "terminal basins could not be resolved and were left empty")
                }
                UnresolvedBasins::Ignore => {}
            }
        }

        let (rows, cols) = self.flow.shape();
        let mut raster = self.flow.raster().with_same_meta::<u32>(rows, cols);
        raster.set_nodata(Some(0));
        let data = raster.data_mut();
        for (id, pixels) in &basins {
            for &idx in pixels.iter().flatten() {
                data[self.flow.unflat(idx)] = *id;
            }
        }

        info!(terminals = basins.len(), empty = empty.len(), "located terminal basins");
        self.basins = Some(Arc::new(raster));
        Ok(BasinSummary {
            terminals: basins.len(),
            empty,
        })
    }

    /// The cached basin raster, if it has been built
    pub fn basins(&self) -> Option<&Raster<u32>> {
        self.basins.as_deref()
    }

    /// The basin raster, built sequentially on first use
    pub fn basin_raster(&mut self) -> Result<&Raster<u32>> {
        if self.basins.is_none() {
            self.locate_basins(&BasinParams::default())?;
        }
        self.basins
            .as_deref()
            .ok_or_else(|| Error::Consistency("basin raster was not built".to_string()))
    }

    /// Discard the cached basin raster
    pub fn clear_basins(&mut self) {
        self.basins = None;
    }

    /// Pixels of the terminal basin that segment `id` drains to
    pub fn basin_mask(&mut self, id: u32) -> Result<Raster<u8>> {
        let terminal = self.terminal_of(id)?;
        let basins = self.basin_raster()?;
        let mut mask = basins.with_same_meta::<u8>(basins.rows(), basins.cols());
        mask.data_mut()
            .zip_mut_with(basins.data(), |m, &label| *m = u8::from(label == terminal));
        Ok(mask)
    }

    /// Whether the local network of each segment drains into another local
    /// network instead of leaving the domain.
    ///
    /// A network is nested when its terminal outlet lies inside a basin
    /// labelled with a different terminal.
    pub fn is_nested(&mut self, ids: Option<&[u32]>) -> Result<Vec<bool>> {
        let positions = self.indices_of(ids)?;
        let mut terminals = Vec::with_capacity(positions.len());
        for &i in &positions {
            let terminal = self.terminal_of(self.segments[i].id)?;
            terminals.push((terminal, self.segment(terminal)?.outlet()));
        }

        let basins = self.basin_raster()?;
        Ok(terminals
            .into_iter()
            .map(|(terminal, outlet)| {
                let label = basins.data()[outlet];
                label != 0 && label != terminal
            })
            .collect())
    }
}
