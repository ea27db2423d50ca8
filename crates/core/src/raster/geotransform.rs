//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and world coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up images, `row_rotation` and `col_rotation` are 0 and
/// `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// World coordinates of the center of pixel (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let col_f = col as f64 + 0.5;
        let row_f = row as f64 + 0.5;

        let x = self.origin_x + col_f * self.pixel_width + row_f * self.row_rotation;
        let y = self.origin_y + col_f * self.col_rotation + row_f * self.pixel_height;

        (x, y)
    }

    /// World coordinates of the top-left corner of pixel (col, row)
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        let col_f = col as f64;
        let row_f = row as f64;

        let x = self.origin_x + col_f * self.pixel_width + row_f * self.row_rotation;
        let y = self.origin_y + col_f * self.col_rotation + row_f * self.pixel_height;

        (x, y)
    }

    /// Ground length of one pixel step along the X axis
    pub fn dx(&self) -> f64 {
        self.pixel_width.hypot(self.col_rotation)
    }

    /// Ground length of one pixel step along the Y axis
    pub fn dy(&self) -> f64 {
        self.pixel_height.hypot(self.row_rotation)
    }

    /// Ground length of a diagonal pixel step
    pub fn pixel_diagonal(&self) -> f64 {
        self.dx().hypot(self.dy())
    }

    /// Ground area covered by a single pixel
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation).abs()
    }

    /// Ground length of the step from a pixel to its neighbor at (dr, dc)
    pub fn step_length(&self, dr: isize, dc: isize) -> f64 {
        let x = dc as f64 * self.pixel_width + dr as f64 * self.row_rotation;
        let y = dc as f64 * self.col_rotation + dr as f64 * self.pixel_height;
        x.hypot(y)
    }

    /// Whether the transform can georeference anything at all
    pub fn is_valid(&self) -> bool {
        let coeffs = [
            self.origin_x,
            self.origin_y,
            self.pixel_width,
            self.pixel_height,
            self.row_rotation,
            self.col_rotation,
        ];
        coeffs.iter().all(|c| c.is_finite()) && self.pixel_area() > 0.0
    }

    /// Compare two transforms within a relative tolerance scaled by pixel size
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        let tol = 1e-9 * self.dx().max(self.dy()).max(1.0);
        let close = |a: f64, b: f64| (a - b).abs() <= tol;
        close(self.origin_x, other.origin_x)
            && close(self.origin_y, other.origin_y)
            && close(self.pixel_width, other.pixel_width)
            && close(self.pixel_height, other.pixel_height)
            && close(self.row_rotation, other.row_rotation)
            && close(self.col_rotation, other.col_rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_centers() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let (x, y) = gt.pixel_to_geo(5, 10);
        assert_relative_eq!(x, 155.0, epsilon = 1e-10);
        assert_relative_eq!(y, 95.0, epsilon = 1e-10);
    }

    #[test]
    fn test_step_lengths() {
        let gt = GeoTransform::new(0.0, 0.0, 10.0, -10.0);
        assert_relative_eq!(gt.step_length(0, 1), 10.0, epsilon = 1e-10);
        assert_relative_eq!(gt.step_length(-1, 0), 10.0, epsilon = 1e-10);
        assert_relative_eq!(gt.step_length(1, 1), gt.pixel_diagonal(), epsilon = 1e-10);
        assert_relative_eq!(gt.pixel_diagonal(), 200.0_f64.sqrt(), epsilon = 1e-10);
        assert_relative_eq!(gt.pixel_area(), 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_validity() {
        assert!(GeoTransform::new(0.0, 10.0, 1.0, -1.0).is_valid());
        assert!(!GeoTransform::new(0.0, 10.0, 0.0, -1.0).is_valid());
        assert!(!GeoTransform::new(f64::NAN, 10.0, 1.0, -1.0).is_valid());
    }

    #[test]
    fn test_approx_eq() {
        let a = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let b = GeoTransform::new(1e-12, 100.0, 1.0, -1.0);
        let c = GeoTransform::new(0.5, 100.0, 1.0, -1.0);
        assert!(a.approx_eq(&b));
        assert!(!a.approx_eq(&c));
    }
}
