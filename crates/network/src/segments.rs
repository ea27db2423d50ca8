//! Stream segment network manager
//!
//! [`Segments`] owns the segment graph built from a flow-direction raster and
//! a stream mask, and answers topology queries over it. Filtering, basin
//! location, statistics and export live in sibling modules as further
//! `impl Segments` blocks.

use crate::flow::FlowGrid;
use crate::graph::{build_segments, Segment};
use crate::traversal::catchment;
use crate::units::LengthUnits;
use firebasin_core::raster::{Raster, RasterElement};
use firebasin_core::{Error, Result};
use geo_types::{Coord, LineString};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Parameters for stream network construction
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    /// Maximum segment length. Longer segments are split into the fewest
    /// equal-length pieces. Must be at least one pixel diagonal.
    pub max_length: Option<f64>,
    /// Units of `max_length`
    pub units: LengthUnits,
}

/// A stream segment network.
///
/// Segments are kept in creation order; filtering only removes segments, so
/// the order of the survivors never changes. Cloning is cheap for the flow
/// grid, stream mask and basin raster, which are shared until one of the
/// clones replaces them.
#[derive(Debug, Clone)]
pub struct Segments {
    pub(crate) flow: Arc<FlowGrid>,
    pub(crate) mask: Arc<Vec<bool>>,
    pub(crate) params: NetworkParams,
    pub(crate) segments: Vec<Segment>,
    pub(crate) index: HashMap<u32, usize>,
    pub(crate) basins: Option<Arc<Raster<u32>>>,
}

impl Segments {
    /// Build a stream segment network.
    ///
    /// # Arguments
    /// * `flow` - D8 flow-direction raster (TauDEM encoding, 0 = no flow)
    /// * `mask` - stream mask on the same grid; non-zero pixels are streams
    /// * `params` - construction parameters
    pub fn new(flow: Raster<u8>, mask: &Raster<u8>, params: NetworkParams) -> Result<Self> {
        let flow = FlowGrid::new(flow)?;
        let in_network = flat_mask(flow.raster(), mask, "stream mask")?;

        let max_length = params.max_length.map(|l| params.units.to_base(l));
        let segments = build_segments(&flow, &in_network, max_length)?;

        info!(
            segments = segments.len(),
            rows = flow.rows(),
            cols = flow.cols(),
            "delineated stream segment network"
        );

        let mut network = Self {
            flow: Arc::new(flow),
            mask: Arc::new(in_network),
            params,
            segments,
            index: HashMap::new(),
            basins: None,
        };
        network.rebuild_index();
        Ok(network)
    }

    pub(crate) fn rebuild_index(&mut self) {
        self.index = self
            .segments
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();
    }

    // Accessors

    /// Number of segments in the network
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment IDs in network order
    pub fn ids(&self) -> Vec<u32> {
        self.segments.iter().map(|s| s.id).collect()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The flow grid the network was built from
    pub fn flow(&self) -> &FlowGrid {
        &self.flow
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// The stream mask the network was built from, as a raster
    pub fn mask(&self) -> Raster<u8> {
        let (rows, cols) = self.flow.shape();
        let mut raster = self.flow.raster().with_same_meta::<u8>(rows, cols);
        for (idx, &inside) in self.mask.iter().enumerate() {
            if inside {
                raster.data_mut()[self.flow.unflat(idx)] = 1;
            }
        }
        raster
    }

    /// Look up a segment by ID
    pub fn segment(&self, id: u32) -> Result<&Segment> {
        Ok(&self.segments[self.position(id)?])
    }

    /// Position of a segment in network order
    pub fn position(&self, id: u32) -> Result<usize> {
        self.index.get(&id).copied().ok_or(Error::SegmentNotFound(id))
    }

    /// Positions of `ids` in network order, or every position when `None`
    pub fn indices_of(&self, ids: Option<&[u32]>) -> Result<Vec<usize>> {
        match ids {
            None => Ok((0..self.segments.len()).collect()),
            Some(ids) => ids.iter().map(|&id| self.position(id)).collect(),
        }
    }

    // Topology

    /// IDs of the segments draining directly into `id`
    pub fn parents(&self, id: u32) -> Result<Vec<u32>> {
        Ok(self.segment(id)?.parents.clone())
    }

    /// ID of the segment `id` drains into
    pub fn child(&self, id: u32) -> Result<Option<u32>> {
        Ok(self.segment(id)?.child)
    }

    /// All segments upstream of `id`, nearest first
    pub fn ancestors(&self, id: u32) -> Result<Vec<u32>> {
        let mut ancestors = Vec::new();
        let mut queue: VecDeque<u32> = self.segment(id)?.parents.iter().copied().collect();
        while let Some(parent) = queue.pop_front() {
            ancestors.push(parent);
            queue.extend(self.segment(parent)?.parents.iter().copied());
        }
        Ok(ancestors)
    }

    /// All segments downstream of `id`, nearest first
    pub fn descendants(&self, id: u32) -> Result<Vec<u32>> {
        let mut descendants = Vec::new();
        let mut current = self.segment(id)?.child;
        while let Some(child) = current {
            if descendants.len() > self.segments.len() {
                return Err(Error::Consistency(format!(
                    "the downstream path from segment {} does not terminate",
                    id
                )));
            }
            descendants.push(child);
            current = self.segment(child)?.child;
        }
        Ok(descendants)
    }

    /// ID of the terminal segment that `id` ultimately drains into
    pub fn terminal_of(&self, id: u32) -> Result<u32> {
        Ok(self.descendants(id)?.last().copied().unwrap_or(id))
    }

    /// Every segment in the local network of `id` (including `id`), in
    /// network order
    pub fn family(&self, id: u32) -> Result<Vec<u32>> {
        let terminal = self.terminal_of(id)?;
        let mut members: HashSet<u32> = self.ancestors(terminal)?.into_iter().collect();
        members.insert(terminal);
        Ok(self
            .segments
            .iter()
            .map(|s| s.id)
            .filter(|id| members.contains(id))
            .collect())
    }

    /// IDs of the terminal segments, in network order
    pub fn termini(&self) -> Vec<u32> {
        self.segments
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| s.id)
            .collect()
    }

    /// Whether each segment is terminal
    pub fn is_terminal(&self, ids: Option<&[u32]>) -> Result<Vec<bool>> {
        Ok(self
            .indices_of(ids)?
            .into_iter()
            .map(|i| self.segments[i].is_terminal())
            .collect())
    }

    /// Local drainage networks as (terminal ID, member IDs in network order),
    /// ordered like [`Segments::termini`]
    pub fn local_networks(&self) -> Result<Vec<(u32, Vec<u32>)>> {
        let mut members: HashMap<u32, Vec<u32>> = HashMap::new();
        for segment in &self.segments {
            let terminal = self.terminal_of(segment.id)?;
            members.entry(terminal).or_default().push(segment.id);
        }
        Ok(self
            .termini()
            .into_iter()
            .map(|t| (t, members.remove(&t).unwrap_or_default()))
            .collect())
    }

    /// Catchment pixel count of each segment's outlet
    pub fn npixels(&self, ids: Option<&[u32]>) -> Result<Vec<u64>> {
        Ok(self
            .indices_of(ids)?
            .into_iter()
            .map(|i| self.segments[i].npixels)
            .collect())
    }

    // Geometry

    /// Polyline of a segment through its pixel centres, upstream to
    /// downstream. The centre of the pixel the outlet drains into is appended
    /// when it lies inside the grid, so connected segments share a vertex.
    pub fn geometry(&self, id: u32) -> Result<LineString<f64>> {
        let segment = self.segment(id)?;
        Ok(self.polyline(segment))
    }

    /// Polylines of every segment, in network order
    pub fn geometries(&self) -> Vec<LineString<f64>> {
        self.segments.iter().map(|s| self.polyline(s)).collect()
    }

    fn polyline(&self, segment: &Segment) -> LineString<f64> {
        let transform = self.flow.transform();
        let (row, col) = segment.outlet();
        let mut coords: Vec<Coord<f64>> = segment
            .pixels
            .iter()
            .chain(self.flow.downstream(row, col).as_ref())
            .map(|&(r, c)| {
                let (x, y) = transform.pixel_to_geo(c, r);
                Coord { x, y }
            })
            .collect();
        // A single isolated pixel still exports as a valid line
        if coords.len() == 1 {
            coords.push(coords[0]);
        }
        LineString::new(coords)
    }

    /// Length of each segment's polyline
    pub fn lengths(&self, units: LengthUnits) -> Vec<f64> {
        self.segments
            .iter()
            .map(|segment| {
                let (row, col) = segment.outlet();
                let mut length: f64 = segment.pixels[..segment.pixels.len() - 1]
                    .iter()
                    .filter_map(|&(r, c)| self.flow.step_length(r, c))
                    .sum();
                if self.flow.downstream(row, col).is_some() {
                    length += self.flow.step_length(row, col).unwrap_or(0.0);
                }
                units.from_base(length)
            })
            .collect()
    }

    /// Outlet pixel of every segment, or of the terminal segments only
    pub fn outlets(&self, terminal_only: bool) -> Vec<(usize, usize)> {
        self.segments
            .iter()
            .filter(|s| !terminal_only || s.is_terminal())
            .map(Segment::outlet)
            .collect()
    }

    /// Raster of segment IDs (0 = not in a segment)
    pub fn raster(&self) -> Raster<u32> {
        let (rows, cols) = self.flow.shape();
        let mut raster = self.flow.raster().with_same_meta::<u32>(rows, cols);
        raster.set_nodata(Some(0));
        let data = raster.data_mut();
        for segment in &self.segments {
            for &pixel in &segment.pixels {
                data[pixel] = segment.id;
            }
        }
        raster
    }

    /// Raster of the pixels draining to (and including) a segment's outlet
    pub fn catchment_mask(&self, id: u32) -> Result<Raster<u8>> {
        let outlet = self.segment(id)?.outlet();
        Ok(self.pixel_mask(&catchment(&self.flow, outlet)))
    }

    pub(crate) fn pixel_mask(&self, pixels: &[usize]) -> Raster<u8> {
        let (rows, cols) = self.flow.shape();
        let mut raster = self.flow.raster().with_same_meta::<u8>(rows, cols);
        let data = raster.data_mut();
        for &idx in pixels {
            data[self.flow.unflat(idx)] = 1;
        }
        raster
    }

    // Validation helpers

    /// Flat boolean view of a mask raster aligned with the network grid.
    /// No-data pixels count as outside the mask.
    pub(crate) fn validate_mask(&self, mask: &Raster<u8>, name: &'static str) -> Result<Vec<bool>> {
        flat_mask(self.flow.raster(), mask, name)
    }

    /// Flat f64 view of a value raster aligned with the network grid, with
    /// no-data converted to NaN
    pub(crate) fn validate_values<T: RasterElement>(
        &self,
        values: &Raster<T>,
        name: &'static str,
    ) -> Result<Vec<f64>> {
        self.flow.raster().ensure_aligned(values, name)?;
        Ok(values.to_f64_array().iter().copied().collect())
    }

    pub(crate) fn log_state(&self, action: &str) {
        debug!(
            action,
            segments = self.segments.len(),
            termini = self.segments.iter().filter(|s| s.is_terminal()).count(),
            cached_basins = self.basins.is_some(),
            "stream network updated"
        );
    }
}

fn flat_mask(reference: &Raster<u8>, mask: &Raster<u8>, name: &'static str) -> Result<Vec<bool>> {
    reference.ensure_aligned(mask, name)?;
    Ok(mask
        .data()
        .iter()
        .map(|&v| v != 0 && !mask.is_nodata(v))
        .collect())
}
