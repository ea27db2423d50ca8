//! Coordinate Reference System handling
//!
//! The stream network never reprojects. A CRS is only carried along with the
//! flow grid and compared when auxiliary rasters are supplied.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System of a raster grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CRS {
    /// An EPSG registry code
    Epsg(u32),
    /// A well-known-text definition
    Wkt(String),
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        CRS::Epsg(code)
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        CRS::Wkt(wkt.into())
    }

    /// EPSG code, if this CRS is registry based
    pub fn epsg(&self) -> Option<u32> {
        match self {
            CRS::Epsg(code) => Some(*code),
            CRS::Wkt(_) => None,
        }
    }

    /// Whether two CRS describe the same system.
    ///
    /// WKT definitions are compared ignoring whitespace. An EPSG code and a
    /// WKT string are never considered equivalent.
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self, other) {
            (CRS::Epsg(a), CRS::Epsg(b)) => a == b,
            (CRS::Wkt(a), CRS::Wkt(b)) => {
                a.split_whitespace().eq(b.split_whitespace())
            }
            _ => false,
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CRS::Epsg(code) => write!(f, "EPSG:{}", code),
            CRS::Wkt(wkt) => {
                // Full WKT is unreadable in error messages
                let end = wkt.char_indices().nth(40).map_or(wkt.len(), |(i, _)| i);
                write!(f, "WKT:{}", &wkt[..end])
            }
        }
    }
}
