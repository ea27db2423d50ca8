//! Ground-distance units
//!
//! Rasters are assumed to use meters as their CRS base unit whenever a unit
//! other than [`LengthUnits::Base`] is requested.

use serde::{Deserialize, Serialize};

/// Units for lengths and areas reported or accepted by the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnits {
    /// The base unit of the raster CRS, without conversion
    Base,
    #[default]
    Meters,
    Kilometers,
    Feet,
    Miles,
}

impl LengthUnits {
    /// Number of base units in one of these units
    pub fn factor(&self) -> f64 {
        match self {
            LengthUnits::Base | LengthUnits::Meters => 1.0,
            LengthUnits::Kilometers => 1000.0,
            LengthUnits::Feet => 0.3048,
            LengthUnits::Miles => 1609.344,
        }
    }

    /// Convert a length in these units to base units
    pub fn to_base(&self, length: f64) -> f64 {
        length * self.factor()
    }

    /// Convert a length in base units to these units
    pub fn from_base(&self, length: f64) -> f64 {
        length / self.factor()
    }

    /// Convert an area in squared base units to squared units
    pub fn area_from_base(&self, area: f64) -> f64 {
        area / (self.factor() * self.factor())
    }
}
