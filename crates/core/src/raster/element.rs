//! Cell value types accepted by rasters

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// A value that can be stored in a raster cell.
///
/// Flow directions and masks are `u8`, segment and basin labels `u32`, and
/// value rasters any numeric type. Statistics read every type as `f64`.
pub trait RasterElement:
    Copy + Debug + PartialOrd + NumCast + Zero + Send + Sync + 'static
{
    /// Whether this value is missing, given the raster's no-data value
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// The value as f64, with missing and unrepresentable values as NaN
    fn to_f64_or_nan(self, nodata: Option<Self>) -> f64 {
        if self.is_nodata(nodata) {
            return f64::NAN;
        }
        <f64 as NumCast>::from(self).unwrap_or(f64::NAN)
    }
}

macro_rules! integer_element {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata == Some(*self)
            }
        }
    )*};
}

macro_rules! float_element {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            // NaN is always missing
            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                self.is_nan() || nodata.is_some_and(|nd| (self - nd).abs() <= <$t>::EPSILON * nd.abs().max(1.0))
            }
        }
    )*};
}

integer_element!(i8, i16, i32, i64, u8, u16, u32, u64);
float_element!(f32, f64);
