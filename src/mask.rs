use crate::raster::BandSet;
use ndarray::Array2;
use ndarray::Zip;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

/// Thresholds used to turn three bands into cloud and shadow masks.
///
/// Every comparison is strict: a pixel sitting exactly on a threshold is
/// not classified by it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaskPolicy {
    /// Mean brightness combined with a normalized difference vegetation index.
    ///
    /// cloud:  brightness > cloud_brightness and ndvi < max_ndvi
    /// shadow: brightness < shadow_brightness and ndvi < max_ndvi and not cloud
    IndexBased {
        cloud_brightness: f32,
        shadow_brightness: f32,
        max_ndvi: f32,
        epsilon: f32,
    },
    /// Absolute per-band thresholds.
    ///
    /// cloud:  red > red_min and green > green_min and nir > nir_min
    /// shadow: nir < shadow_nir_max and not cloud
    AbsoluteThreshold {
        red_min: f32,
        green_min: f32,
        nir_min: f32,
        shadow_nir_max: f32,
    },
}

impl MaskPolicy {
    pub fn index_based() -> Self {
        Self::IndexBased {
            cloud_brightness: 0.6,
            shadow_brightness: 0.2,
            max_ndvi: 0.2,
            epsilon: 1e-6,
        }
    }

    pub fn absolute_threshold() -> Self {
        Self::AbsoluteThreshold {
            red_min: 0.2,
            green_min: 0.2,
            nir_min: 0.3,
            shadow_nir_max: 0.1,
        }
    }

    pub fn apply(&self, bands: &BandSet) -> Masks {
        debug!(policy = ?self, dim = ?bands.dim(), "computing masks");

        match *self {
            Self::IndexBased {
                cloud_brightness,
                shadow_brightness,
                max_ndvi,
                epsilon,
            } => {
                let brightness = brightness(bands);
                let ndvi = ndvi(bands, epsilon);

                let cloud = Zip::from(&brightness)
                    .and(&ndvi)
                    .map_collect(|&b, &v| b > cloud_brightness && v < max_ndvi);
                let shadow = Zip::from(&brightness)
                    .and(&ndvi)
                    .and(&cloud)
                    .map_collect(|&b, &v, &c| b < shadow_brightness && v < max_ndvi && !c);

                Masks {
                    cloud,
                    shadow,
                    ndvi: Some(ndvi),
                }
            }
            Self::AbsoluteThreshold {
                red_min,
                green_min,
                nir_min,
                shadow_nir_max,
            } => {
                let cloud = Zip::from(bands.red())
                    .and(bands.green())
                    .and(bands.nir())
                    .map_collect(|&r, &g, &n| r > red_min && g > green_min && n > nir_min);
                let shadow = Zip::from(bands.nir())
                    .and(&cloud)
                    .map_collect(|&n, &c| n < shadow_nir_max && !c);

                Masks {
                    cloud,
                    shadow,
                    ndvi: None,
                }
            }
        }
    }
}

/// Output of a [`MaskPolicy`]; every grid has the shape of the input bands.
#[derive(Debug, Clone, PartialEq)]
pub struct Masks {
    pub cloud: Array2<bool>,
    pub shadow: Array2<bool>,
    /// Only produced by [`MaskPolicy::IndexBased`].
    pub ndvi: Option<Array2<f32>>,
}

/// Per-pixel mean of the three bands.
pub fn brightness(bands: &BandSet) -> Array2<f32> {
    Zip::from(bands.red())
        .and(bands.green())
        .and(bands.nir())
        .map_collect(|&r, &g, &n| (r + g + n) / 3.0)
}

/// `(nir - red) / (nir + red + epsilon)`, roughly in [-1, 1].
pub fn ndvi(bands: &BandSet, epsilon: f32) -> Array2<f32> {
    Zip::from(bands.nir())
        .and(bands.red())
        .map_collect(|&n, &r| (n - r) / (n + r + epsilon))
}
