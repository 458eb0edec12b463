use crate::generate::FixtureParams;
use crate::mask::MaskPolicy;
use crate::raster::Normalization;
use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use std::{io::Read, path::Path, path::PathBuf};

/// Paths and thresholds for every subcommand.
///
/// Loaded from an optional TOML file; any table or key left out falls back
/// to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub photo: PhotoParams,
    pub raster: RasterParams,
    pub fixture: FixtureParams,
}

/// Settings for converting and masking an ordinary photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoParams {
    /// Side length the photo is resized to.
    pub size: u32,
    /// Outputs go to `{output_root}/{photo stem}/`.
    pub output_root: PathBuf,
    pub pixel_size: f64,
    pub normalization: Normalization,
    pub policy: MaskPolicy,
}

impl Default for PhotoParams {
    fn default() -> Self {
        Self {
            size: 256,
            output_root: PathBuf::from("output_image"),
            pixel_size: 10.0,
            normalization: Normalization::PerBandMax,
            policy: MaskPolicy::index_based(),
        }
    }
}

/// Settings for masking an existing raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterParams {
    pub input: PathBuf,
    pub output: PathBuf,
    pub normalization: Normalization,
    pub policy: MaskPolicy,
}

impl Default for RasterParams {
    fn default() -> Self {
        Self {
            input: PathBuf::from("sample_image.tif"),
            output: PathBuf::from("output.png"),
            normalization: Normalization::fixed_scale(),
            policy: MaskPolicy::absolute_threshold(),
        }
    }
}

pub fn parse_params(path: &Path) -> Result<Params> {
    let mut buffer = String::new();
    std::fs::File::open(path)
        .with_context(|| format!("opening params {}", path.display()))?
        .read_to_string(&mut buffer)?;
    let params = toml::from_str(&buffer)
        .with_context(|| format!("parsing params {}", path.display()))?;

    Ok(params)
}

/// Parameters from `path`, or the defaults when no file is given.
pub fn load(path: Option<&Path>) -> Result<Params> {
    match path {
        Some(path) => parse_params(path),
        None => Ok(Params::default()),
    }
}
