//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in a 2D grid with optional
/// geographic metadata (affine transform, CRS and no-data value).
///
/// # Example
///
/// ```ignore
/// use firebasin_core::{GeoTransform, Raster};
///
/// let mut flow: Raster<u8> = Raster::new(3, 3);
/// flow.set_transform(GeoTransform::new(0.0, 3.0, 10.0, -10.0));
/// flow.set(1, 1, 7)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation, if georeferenced
    transform: Option<GeoTransform>,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// No-data value
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        let len = data.len();
        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|_| Error::InvalidDimensions { rows, cols, len })?;
        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: None,
            crs: None,
            nodata: None,
        }
    }

    /// Create a zero-filled raster with the same transform and CRS but a
    /// different data type
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    // Metadata

    /// Get the geotransform, if any
    pub fn transform(&self) -> Option<&GeoTransform> {
        self.transform.as_ref()
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = Some(transform);
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Copy of the data as f64, with no-data converted to NaN
    pub fn to_f64_array(&self) -> Array2<f64> {
        let nodata = self.nodata;
        self.data.mapv(|v| v.to_f64_or_nan(nodata))
    }

    /// Convert pixel coordinates to world coordinates (pixel center)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> Option<(f64, f64)> {
        self.transform.map(|t| t.pixel_to_geo(col, row))
    }

    // Validation

    /// Require a valid transform on this raster
    pub fn require_transform(&self, name: &'static str) -> Result<&GeoTransform> {
        match &self.transform {
            Some(t) if t.is_valid() => Ok(t),
            _ => Err(Error::MissingTransform { name }),
        }
    }

    /// Check that `other` lies on the same grid as this raster.
    ///
    /// Shapes must match exactly. Transforms and CRS are compared only when
    /// both rasters carry them, so bare arrays are accepted and inherit this
    /// raster's georeferencing.
    pub fn ensure_aligned<U: RasterElement>(
        &self,
        other: &Raster<U>,
        name: &'static str,
    ) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::SizeMismatch {
                name,
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        if let (Some(a), Some(b)) = (&self.transform, other.transform()) {
            if !a.approx_eq(b) {
                return Err(Error::TransformMismatch { name });
            }
        }
        if let (Some(a), Some(b)) = (&self.crs, other.crs()) {
            if !a.is_equivalent(b) {
                return Err(Error::CrsMismatch {
                    name,
                    expected: a.to_string(),
                    actual: b.to_string(),
                });
            }
        }
        Ok(())
    }
}
