//! Per-segment and per-catchment statistics
//!
//! Values are read from a raster aligned with the network grid; no-data
//! pixels become NaN. Statistics without a `nan` prefix return NaN when any
//! contributing pixel is NaN. `nan` statistics skip NaN pixels and return NaN
//! only when nothing is left. An empty pixel set always yields NaN.
//!
//! Catchment means and sums are computed for every pixel at once by flow
//! accumulation. Every other catchment statistic walks each catchment
//! separately, which is far slower on large networks.

use crate::segments::Segments;
use crate::traversal::{accumulate, catchment};
use firebasin_core::raster::{Raster, RasterElement};
use firebasin_core::{Error, Result};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// A named reduction over a set of pixel values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic {
    /// Value at the outlet pixel; ignores any data mask
    Outlet,
    Min,
    Max,
    Mean,
    Median,
    /// Population standard deviation
    Std,
    /// Population variance
    Var,
    Sum,
    NanMin,
    NanMax,
    NanMean,
    NanMedian,
    NanStd,
    NanVar,
    NanSum,
    /// Percentile in 0-100, linearly interpolated
    Percentile(f64),
    NanPercentile(f64),
}

impl Statistic {
    /// Whether NaN values are skipped rather than propagated
    pub fn ignores_nan(&self) -> bool {
        matches!(
            self,
            Statistic::NanMin
                | Statistic::NanMax
                | Statistic::NanMean
                | Statistic::NanMedian
                | Statistic::NanStd
                | Statistic::NanVar
                | Statistic::NanSum
                | Statistic::NanPercentile(_)
        )
    }

    /// Whether catchment values come from a single flow accumulation pass
    pub fn is_accumulated(&self) -> bool {
        matches!(
            self,
            Statistic::Outlet | Statistic::Mean | Statistic::Sum | Statistic::NanMean | Statistic::NanSum
        )
    }

    fn validate(&self) -> Result<()> {
        match self {
            Statistic::Percentile(q) | Statistic::NanPercentile(q) if !(0.0..=100.0).contains(q) => {
                Err(Error::InvalidParameter {
                    name: "percentile",
                    value: q.to_string(),
                    reason: "must be between 0 and 100".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Reduce a set of values
    pub fn reduce(&self, values: &[f64]) -> f64 {
        let mut data: Vec<f64> = if self.ignores_nan() {
            values.iter().copied().filter(|v| !v.is_nan()).collect()
        } else if values.iter().any(|v| v.is_nan()) {
            return f64::NAN;
        } else {
            values.to_vec()
        };
        if data.is_empty() {
            return f64::NAN;
        }

        match self {
            Statistic::Outlet => data[data.len() - 1],
            Statistic::Min | Statistic::NanMin => data.iter().copied().fold(f64::INFINITY, f64::min),
            Statistic::Max | Statistic::NanMax => data.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Statistic::Mean | Statistic::NanMean => mean(&data),
            Statistic::Sum | Statistic::NanSum => data.iter().sum(),
            Statistic::Var | Statistic::NanVar => variance(&data),
            Statistic::Std | Statistic::NanStd => variance(&data).sqrt(),
            Statistic::Median | Statistic::NanMedian => percentile(&mut data, 50.0),
            Statistic::Percentile(q) | Statistic::NanPercentile(q) => percentile(&mut data, *q),
        }
    }
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

fn variance(data: &[f64]) -> f64 {
    let m = mean(data);
    data.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / data.len() as f64
}

/// Linear interpolation between closest ranks
fn percentile(data: &mut [f64], q: f64) -> f64 {
    data.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let position = q / 100.0 * (data.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    data[lower] + (data[upper] - data[lower]) * (position - lower as f64)
}

impl FromStr for Statistic {
    type Err = Error;

    /// Parse a statistic name, e.g. `"nanmean"` or `"percentile:90"`
    fn from_str(name: &str) -> Result<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let statistic = match lower.as_str() {
            "outlet" => Statistic::Outlet,
            "min" => Statistic::Min,
            "max" => Statistic::Max,
            "mean" => Statistic::Mean,
            "median" => Statistic::Median,
            "std" => Statistic::Std,
            "var" => Statistic::Var,
            "sum" => Statistic::Sum,
            "nanmin" => Statistic::NanMin,
            "nanmax" => Statistic::NanMax,
            "nanmean" => Statistic::NanMean,
            "nanmedian" => Statistic::NanMedian,
            "nanstd" => Statistic::NanStd,
            "nanvar" => Statistic::NanVar,
            "nansum" => Statistic::NanSum,
            other => {
                let (kind, q) = other
                    .split_once(':')
                    .ok_or_else(|| Error::UnknownStatistic(name.to_string()))?;
                let q: f64 = q
                    .trim()
                    .parse()
                    .map_err(|_| Error::UnknownStatistic(name.to_string()))?;
                match kind {
                    "percentile" => Statistic::Percentile(q),
                    "nanpercentile" => Statistic::NanPercentile(q),
                    _ => return Err(Error::UnknownStatistic(name.to_string())),
                }
            }
        };
        statistic.validate()?;
        Ok(statistic)
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Outlet => write!(f, "outlet"),
            Statistic::Min => write!(f, "min"),
            Statistic::Max => write!(f, "max"),
            Statistic::Mean => write!(f, "mean"),
            Statistic::Median => write!(f, "median"),
            Statistic::Std => write!(f, "std"),
            Statistic::Var => write!(f, "var"),
            Statistic::Sum => write!(f, "sum"),
            Statistic::NanMin => write!(f, "nanmin"),
            Statistic::NanMax => write!(f, "nanmax"),
            Statistic::NanMean => write!(f, "nanmean"),
            Statistic::NanMedian => write!(f, "nanmedian"),
            Statistic::NanStd => write!(f, "nanstd"),
            Statistic::NanVar => write!(f, "nanvar"),
            Statistic::NanSum => write!(f, "nansum"),
            Statistic::Percentile(q) => write!(f, "percentile:{}", q),
            Statistic::NanPercentile(q) => write!(f, "nanpercentile:{}", q),
        }
    }
}

impl Segments {
    /// Compute a statistic over the pixels of each segment, in network order.
    ///
    /// # Arguments
    /// * `statistic` - reduction to apply
    /// * `values` - value raster aligned with the network
    /// * `mask` - optional data mask; pixels outside it are skipped
    pub fn summary<T: RasterElement>(
        &self,
        statistic: Statistic,
        values: &Raster<T>,
        mask: Option<&Raster<u8>>,
    ) -> Result<Vec<f64>> {
        statistic.validate()?;
        let values = self.validate_values(values, "values")?;
        let include = mask.map(|m| self.validate_mask(m, "data mask")).transpose()?;
        let cols = self.flow.cols();

        Ok(self
            .segments
            .iter()
            .map(|segment| {
                if statistic == Statistic::Outlet {
                    let (row, col) = segment.outlet();
                    return values[row * cols + col];
                }
                let data: Vec<f64> = segment
                    .pixels
                    .iter()
                    .map(|&(row, col)| row * cols + col)
                    .filter(|&idx| include.as_ref().map_or(true, |m| m[idx]))
                    .map(|idx| values[idx])
                    .collect();
                statistic.reduce(&data)
            })
            .collect())
    }

    /// Compute a statistic over the catchment of each segment's outlet.
    ///
    /// Returns one value per segment in network order, or one per terminal
    /// segment when `terminal_only` is set.
    pub fn catchment_summary<T: RasterElement>(
        &self,
        statistic: Statistic,
        values: &Raster<T>,
        mask: Option<&Raster<u8>>,
        terminal_only: bool,
    ) -> Result<Vec<f64>> {
        statistic.validate()?;
        let values = self.validate_values(values, "values")?;
        let include = mask.map(|m| self.validate_mask(m, "data mask")).transpose()?;
        self.catchment_values(statistic, &values, include.as_deref(), terminal_only)
    }

    /// Catchment statistic over already-validated flat arrays
    pub(crate) fn catchment_values(
        &self,
        statistic: Statistic,
        values: &[f64],
        include: Option<&[bool]>,
        terminal_only: bool,
    ) -> Result<Vec<f64>> {
        let outlets: Vec<usize> = self
            .outlets(terminal_only)
            .into_iter()
            .map(|(row, col)| self.flow.flat(row, col))
            .collect();

        debug!(
            statistic = %statistic,
            catchments = outlets.len(),
            accumulated = statistic.is_accumulated(),
            "computing catchment statistic"
        );

        if statistic == Statistic::Outlet {
            return Ok(outlets.into_iter().map(|idx| values[idx]).collect());
        }

        if statistic.is_accumulated() {
            let acc = accumulate(&self.flow, Some(values), include);
            return Ok(outlets
                .into_iter()
                .map(|idx| {
                    let (sum, count, nans) = (acc.sum[idx], acc.count[idx], acc.nans[idx]);
                    if count == 0 || (nans > 0 && !statistic.ignores_nan()) {
                        return f64::NAN;
                    }
                    match statistic {
                        Statistic::Mean | Statistic::NanMean => sum / count as f64,
                        _ => sum,
                    }
                })
                .collect());
        }

        Ok(outlets
            .into_iter()
            .map(|idx| {
                let outlet = self.flow.unflat(idx);
                let data: Vec<f64> = catchment(&self.flow, outlet)
                    .into_iter()
                    .filter(|&p| include.map_or(true, |m| m[p]))
                    .map(|p| values[p])
                    .collect();
                statistic.reduce(&data)
            })
            .collect())
    }
}
