//! Vector export of segments, outlets and basins
//!
//! Each export takes caller-computed properties as named arrays with one
//! value per exported feature.

use crate::segments::Segments;
use firebasin_core::vector::{Feature, FeatureCollection};
use firebasin_core::{Error, Result};
use geo::BooleanOps;
use geo_types::{LineString, MultiPolygon, Point, Polygon};
use tracing::debug;

/// Named per-feature values attached to exported features
pub type Properties<'a> = [(&'a str, Vec<f64>)];

fn check_properties(properties: &Properties<'_>, expected: usize) -> Result<()> {
    for (name, values) in properties {
        if values.len() != expected {
            return Err(Error::PropertyLength {
                name: name.to_string(),
                expected,
                actual: values.len(),
            });
        }
    }
    Ok(())
}

fn attach(feature: &mut Feature, properties: &Properties<'_>, i: usize) {
    for (name, values) in properties {
        feature.set_property(*name, values[i]);
    }
}

impl Segments {
    /// One `LineString` feature per segment, in network order
    pub fn segment_features(&self, properties: &Properties<'_>) -> Result<FeatureCollection> {
        check_properties(properties, self.len())?;
        let mut collection = FeatureCollection::new();
        for (i, (segment, line)) in self.segments.iter().zip(self.geometries()).enumerate() {
            let mut feature = Feature::new(line).with_id(segment.id);
            attach(&mut feature, properties, i);
            collection.push(feature);
        }
        Ok(collection)
    }

    /// One `Point` feature per outlet, for every segment or terminal
    /// segments only
    pub fn outlet_features(&self, properties: &Properties<'_>, terminal_only: bool) -> Result<FeatureCollection> {
        let segments: Vec<_> = self
            .segments
            .iter()
            .filter(|s| !terminal_only || s.is_terminal())
            .collect();
        check_properties(properties, segments.len())?;

        let transform = self.flow.transform();
        let mut collection = FeatureCollection::new();
        for (i, segment) in segments.into_iter().enumerate() {
            let (row, col) = segment.outlet();
            let (x, y) = transform.pixel_to_geo(col, row);
            let mut feature = Feature::new(Point::new(x, y)).with_id(segment.id);
            attach(&mut feature, properties, i);
            collection.push(feature);
        }
        Ok(collection)
    }

    /// One `MultiPolygon` feature per terminal basin, ordered like
    /// [`Segments::termini`]. Builds the basin raster if needed. Empty basins
    /// export without geometry.
    pub fn basin_features(&mut self, properties: &Properties<'_>) -> Result<FeatureCollection> {
        let termini = self.termini();
        check_properties(properties, termini.len())?;

        let basins = self.basin_raster()?;
        let transform = *basins.require_transform("basin")?;
        let (rows, cols) = basins.shape();
        let data = basins.data();

        let mut collection = FeatureCollection::new();
        for (i, &terminal) in termini.iter().enumerate() {
            let mut outline = MultiPolygon::<f64>::new(Vec::new());
            for row in 0..rows {
                // Runs of the basin along this row, as pixel rectangles
                let mut runs = Vec::new();
                let mut col = 0;
                while col < cols {
                    if data[(row, col)] != terminal {
                        col += 1;
                        continue;
                    }
                    let start = col;
                    while col < cols && data[(row, col)] == terminal {
                        col += 1;
                    }
                    let (x0, y0) = transform.pixel_to_geo_corner(start, row);
                    let (x1, y1) = transform.pixel_to_geo_corner(col, row + 1);
                    runs.push(Polygon::new(
                        LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]),
                        Vec::new(),
                    ));
                }
                if !runs.is_empty() {
                    outline = outline.union(&MultiPolygon::new(runs));
                }
            }

            let mut feature = if outline.0.is_empty() {
                Feature {
                    geometry: None,
                    properties: Default::default(),
                    id: Some(terminal),
                }
            } else {
                Feature::new(outline).with_id(terminal)
            };
            attach(&mut feature, properties, i);
            collection.push(feature);
        }

        debug!(basins = collection.len(), "exported terminal basins");
        Ok(collection)
    }
}
