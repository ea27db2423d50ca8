//! D8 flow-direction model
//!
//! Interprets a TauDEM-style D8 raster as a function from a pixel to the
//! neighbor it drains into.
//!
//! Direction encoding:
//! ```text
//!   4  3  2
//!   5  0  1
//!   6  7  8
//! ```
//! 0 = no data / no flow, 1-8 = direction to the downstream neighbor

use firebasin_core::raster::{GeoTransform, Raster};
use firebasin_core::{Error, Result};
use ndarray::Array2;

/// D8 neighbor offsets: (row_offset, col_offset)
/// Indexed to match the direction encoding (1=E, 2=NE, ..., 8=SE)
pub const D8_OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // 1: E
    (-1, 1),  // 2: NE
    (-1, 0),  // 3: N
    (-1, -1), // 4: NW
    (0, -1),  // 5: W
    (1, -1),  // 6: SW
    (1, 0),   // 7: S
    (1, 1),   // 8: SE
];

/// Get the opposite direction code
pub fn opposite_dir(dir: u8) -> u8 {
    if dir == 0 {
        return 0;
    }
    ((dir - 1 + 4) % 8) + 1
}

/// Immutable D8 flow grid with its georeferencing.
///
/// Codes are normalized on construction: the raster's no-data value (if it
/// is not already 0) becomes 0.
#[derive(Debug, Clone)]
pub struct FlowGrid {
    codes: Array2<u8>,
    transform: GeoTransform,
    raster: Raster<u8>,
}

impl FlowGrid {
    /// Validate and wrap a flow-direction raster.
    ///
    /// Fails if the raster has no usable transform, or if any valid cell
    /// holds a code outside 0-8.
    pub fn new(raster: Raster<u8>) -> Result<Self> {
        let transform = *raster.require_transform("flow direction")?;
        let nodata = raster.nodata();

        let mut codes = raster.data().clone();
        for ((row, col), code) in codes.indexed_iter_mut() {
            if Some(*code) == nodata {
                *code = 0;
            } else if *code > 8 {
                return Err(Error::InvalidParameter {
                    name: "flow",
                    value: code.to_string(),
                    reason: format!(
                        "flow direction at ({}, {}) is not a D8 code in 0-8",
                        row, col
                    ),
                });
            }
        }

        let mut normalized = Raster::from_array(codes.clone());
        normalized.set_transform(transform);
        normalized.set_crs(raster.crs().cloned());
        normalized.set_nodata(Some(0));

        Ok(Self {
            codes,
            transform,
            raster: normalized,
        })
    }

    /// The normalized flow raster (no-data = 0)
    pub fn raster(&self) -> &Raster<u8> {
        &self.raster
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn shape(&self) -> (usize, usize) {
        self.codes.dim()
    }

    pub fn rows(&self) -> usize {
        self.codes.nrows()
    }

    pub fn cols(&self) -> usize {
        self.codes.ncols()
    }

    /// Number of pixels in the grid
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Direction code at a pixel
    pub fn code(&self, row: usize, col: usize) -> u8 {
        self.codes[(row, col)]
    }

    /// Whether the pixel carries a flow direction
    pub fn has_flow(&self, row: usize, col: usize) -> bool {
        self.codes[(row, col)] != 0
    }

    /// The neighbor (row, col) at direction `dir` from a pixel, if in bounds
    fn neighbor(&self, row: usize, col: usize, dir: u8) -> Option<(usize, usize)> {
        let (dr, dc) = D8_OFFSETS[(dir - 1) as usize];
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= self.rows() as isize || nc >= self.cols() as isize {
            None
        } else {
            Some((nr as usize, nc as usize))
        }
    }

    /// The pixel this pixel drains into.
    ///
    /// `None` for no-flow pixels and for boundary outlets that drain off
    /// the grid.
    pub fn downstream(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        match self.codes[(row, col)] {
            0 => None,
            dir => self.neighbor(row, col, dir),
        }
    }

    /// Neighbors that drain directly into (row, col)
    pub fn upstream(&self, row: usize, col: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        (1..=8u8).filter_map(move |dir| {
            let (nr, nc) = self.neighbor(row, col, dir)?;
            // The neighbor in direction `dir` drains here if it points back
            if self.codes[(nr, nc)] == opposite_dir(dir) {
                Some((nr, nc))
            } else {
                None
            }
        })
    }

    /// Ground distance from a pixel to its downstream neighbor.
    ///
    /// `None` for no-flow pixels. Boundary outlets still report the step
    /// length of their (off-grid) direction.
    pub fn step_length(&self, row: usize, col: usize) -> Option<f64> {
        match self.codes[(row, col)] {
            0 => None,
            dir => {
                let (dr, dc) = D8_OFFSETS[(dir - 1) as usize];
                Some(self.transform.step_length(dr, dc))
            }
        }
    }

    /// Flat (row-major) index of a pixel
    pub fn flat(&self, row: usize, col: usize) -> usize {
        row * self.cols() + col
    }

    /// (row, col) of a flat index
    pub fn unflat(&self, idx: usize) -> (usize, usize) {
        (idx / self.cols(), idx % self.cols())
    }
}
