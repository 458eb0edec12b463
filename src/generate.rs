use crate::raster;
use crate::raster::BandSet;
use crate::raster::GeoTransform;
use anyhow::Context;
use anyhow::Result;
use ndarray::Array2;
use rand::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Shape and value range of a synthetic three-band raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureParams {
    pub output: PathBuf,
    pub width: usize,
    pub height: usize,
    /// Values are drawn uniformly from [0, max_value).
    pub max_value: f32,
    /// Ground size of one pixel in the dummy geotransform.
    pub pixel_size: f64,
    /// Fixed seed for a reproducible fixture. Drawn from entropy when unset.
    pub seed: Option<u64>,
}

impl Default for FixtureParams {
    fn default() -> Self {
        Self {
            output: PathBuf::from("sample_image.tif"),
            width: 256,
            height: 256,
            max_value: raster::DEFAULT_SCALE,
            pixel_size: 10.0,
            seed: None,
        }
    }
}

impl FixtureParams {
    pub fn transform(&self) -> GeoTransform {
        GeoTransform::from_origin(0.0, 0.0, self.pixel_size, self.pixel_size)
    }
}

/// Three independent grids of uniform noise.
pub fn synthesize(params: &FixtureParams) -> Result<BandSet> {
    anyhow::ensure!(
        params.max_value > 0.0,
        "fixture max_value must be positive, got {}",
        params.max_value
    );

    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let shape = (params.height, params.width);
    let mut band = || Array2::from_shape_fn(shape, |_| rng.gen_range(0.0..params.max_value));
    let (red, green, nir) = (band(), band(), band());

    Ok(BandSet::new(red, green, nir)?)
}

/// Write a synthetic fixture to `output`.
pub fn run(params: &FixtureParams, output: &Path) -> Result<()> {
    let bands = synthesize(params)?;
    raster::write_bands(output, &bands, &params.transform())
        .with_context(|| format!("writing fixture {}", output.display()))?;
    info!(path = %output.display(), width = params.width, height = params.height, "fixture generated");

    Ok(())
}
