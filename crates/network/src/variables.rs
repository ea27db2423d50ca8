//! Derived catchment variables
//!
//! Area, burn and terrain variables used as inputs to debris-flow hazard
//! models. Catchment quantities are reported per segment, or per terminal
//! segment when `terminal_only` is set.

use crate::segments::Segments;
use crate::statistics::Statistic;
use crate::traversal::accumulate;
use crate::units::LengthUnits;
use firebasin_core::raster::{Raster, RasterElement};
use firebasin_core::Result;

impl Segments {
    /// Pixel counts of each catchment, optionally restricted to a mask
    fn catchment_counts(&self, mask: Option<&Raster<u8>>, terminal_only: bool) -> Result<Vec<u64>> {
        let include = mask.map(|m| self.validate_mask(m, "area mask")).transpose()?;
        let acc = accumulate(&self.flow, None, include.as_deref());
        Ok(self
            .outlets(terminal_only)
            .into_iter()
            .map(|(row, col)| acc.count[self.flow.flat(row, col)])
            .collect())
    }

    /// Catchment area, optionally counting only the pixels inside `mask`
    pub fn area(&self, mask: Option<&Raster<u8>>, units: LengthUnits, terminal_only: bool) -> Result<Vec<f64>> {
        let pixel_area = self.flow.transform().pixel_area();
        Ok(self
            .catchment_counts(mask, terminal_only)?
            .into_iter()
            .map(|count| units.area_from_base(count as f64 * pixel_area))
            .collect())
    }

    /// Burned area of each catchment
    pub fn burned_area(&self, burned: &Raster<u8>, units: LengthUnits, terminal_only: bool) -> Result<Vec<f64>> {
        self.area(Some(burned), units, terminal_only)
    }

    /// Fraction of each catchment that is burned
    pub fn burn_ratio(&self, burned: &Raster<u8>, terminal_only: bool) -> Result<Vec<f64>> {
        let burned = self.catchment_counts(Some(burned), terminal_only)?;
        let total = self.catchment_counts(None, terminal_only)?;
        Ok(burned
            .into_iter()
            .zip(total)
            .map(|(b, t)| if t == 0 { f64::NAN } else { b as f64 / t as f64 })
            .collect())
    }

    /// Vertical relief at each outlet, read from a relief raster
    pub fn relief<T: RasterElement>(&self, relief: &Raster<T>, terminal_only: bool) -> Result<Vec<f64>> {
        self.catchment_summary(Statistic::Outlet, relief, None, terminal_only)
    }

    /// Relief divided by the square root of catchment area
    pub fn ruggedness<T: RasterElement>(
        &self,
        relief: &Raster<T>,
        units: LengthUnits,
        terminal_only: bool,
    ) -> Result<Vec<f64>> {
        let relief = self.relief(relief, terminal_only)?;
        let area = self.area(None, units, terminal_only)?;
        Ok(relief
            .into_iter()
            .zip(area)
            .map(|(r, a)| r / a.sqrt())
            .collect())
    }

    /// Mean slope along each segment
    pub fn slope<T: RasterElement>(&self, slopes: &Raster<T>) -> Result<Vec<f64>> {
        self.summary(Statistic::Mean, slopes, None)
    }

    /// Whether any pixel of each segment lies inside `mask`
    pub fn in_mask(&self, mask: &Raster<u8>, terminal_only: bool) -> Result<Vec<bool>> {
        let include = self.validate_mask(mask, "mask")?;
        Ok(self
            .segments
            .iter()
            .filter(|s| !terminal_only || s.is_terminal())
            .map(|s| s.pixels.iter().any(|&(row, col)| include[self.flow.flat(row, col)]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::tests::{flow_raster, full_mask, y_network};
    use crate::NetworkParams;
    use approx::assert_relative_eq;
    use firebasin_core::GeoTransform;

    #[test]
    fn test_area_units() {
        // 1x4 strip of 10 m pixels
        let mut flow = flow_raster(&[1; 4], 1, 4);
        flow.set_transform(GeoTransform::new(0.0, 10.0, 10.0, -10.0));
        let network = Segments::new(flow, &full_mask(1, 4), NetworkParams::default()).unwrap();
        let area = network.area(None, LengthUnits::Meters, false).unwrap();
        assert_relative_eq!(area[0], 400.0);
        let km = network.area(None, LengthUnits::Kilometers, true).unwrap();
        assert_relative_eq!(km[0], 0.0004, epsilon = 1e-12);
    }

    #[test]
    fn test_burn_variables() {
        let network = y_network();
        let mut burned = Raster::new(3, 3);
        burned.set(0, 0, 1).unwrap();
        burned.set(0, 2, 1).unwrap();

        let ratio = network.burn_ratio(&burned, false).unwrap();
        assert_relative_eq!(ratio[0], 0.5);
        assert_relative_eq!(ratio[2], 0.4, epsilon = 1e-12);

        let area = network.burned_area(&burned, LengthUnits::Base, true).unwrap();
        assert_eq!(area, vec![2.0]);
    }

    #[test]
    fn test_relief_and_ruggedness() {
        let network = y_network();
        let relief = Raster::filled(3, 3, 10.0_f64);
        assert_eq!(network.relief(&relief, true).unwrap(), vec![10.0]);
        let ruggedness = network.ruggedness(&relief, LengthUnits::Base, true).unwrap();
        assert_relative_eq!(ruggedness[0], 10.0 / 5.0_f64.sqrt());
    }

    #[test]
    fn test_slope_and_in_mask() {
        let network = y_network();
        let slopes = Raster::from_vec(vec![0.1, 0.0, 0.3, 0.3, 0.0, 0.5, 0.0, 0.2, 0.0], 3, 3).unwrap();
        let slope = network.slope(&slopes).unwrap();
        assert_relative_eq!(slope[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(slope[1], 0.4, epsilon = 1e-12);

        let mut mask = Raster::new(3, 3);
        mask.set(1, 2, 1).unwrap();
        assert_eq!(network.in_mask(&mask, false).unwrap(), vec![false, true, false]);
        assert_eq!(network.in_mask(&mask, true).unwrap(), vec![false]);
    }
}
