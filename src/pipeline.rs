use crate::config::PhotoParams;
use crate::config::RasterParams;
use crate::convert;
use crate::generate;
use crate::generate::FixtureParams;
use crate::mask::Masks;
use crate::raster;
use crate::raster::GeoTransform;
use crate::render;
use crate::summary::CloudCover;
use anyhow::Context;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where a photo run left its files.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoOutputs {
    pub dir: PathBuf,
    pub raster: PathBuf,
    pub composite: PathBuf,
    pub ndvi: Option<PathBuf>,
    pub cover: CloudCover,
}

/// Convert a photo to a raster, mask it and write figures plus a summary.
///
/// Outputs land in `output_dir`, or `{output_root}/{photo stem}` when unset.
pub fn run_photo(
    params: &PhotoParams,
    input: &Path,
    output_dir: Option<&Path>,
) -> Result<PhotoOutputs> {
    let base_name = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("no file name in {}", input.display()))?;
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => params.output_root.join(base_name),
    };

    println!("Processing image: {}", input.display());

    let transform = GeoTransform::from_origin(0.0, 0.0, params.pixel_size, params.pixel_size);
    let raster_path = convert::photo_to_raster(input, &dir, params.size, &transform)?;
    println!("TIFF created: {}", raster_path.display());

    let (bands, _) = raster::read_bands(&raster_path, params.normalization)
        .with_context(|| format!("reading {}", raster_path.display()))?;
    let masks = params.policy.apply(&bands);

    let composite = dir.join(format!("{base_name}_output.png"));
    render::write_image(&render::render_composite(&bands, &masks), &composite)?;

    let ndvi = match &masks.ndvi {
        Some(grid) => {
            let path = dir.join(format!("{base_name}_ndvi_debug.png"));
            render::write_image(&render::render_ndvi(grid), &path)?;
            Some(path)
        }
        None => None,
    };

    let cover = CloudCover::from_mask(&masks.cloud);
    cover.report();
    println!("Output saved in folder: {}", dir.display());

    Ok(PhotoOutputs {
        dir,
        raster: raster_path,
        composite,
        ndvi,
        cover,
    })
}

/// Mask an existing raster and write the composite figure.
pub fn run_raster(params: &RasterParams, input: &Path, output: &Path) -> Result<Masks> {
    let (bands, _) = raster::read_bands(input, params.normalization)
        .with_context(|| format!("reading {}", input.display()))?;
    let masks = params.policy.apply(&bands);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    render::write_image(&render::render_composite(&bands, &masks), output)?;
    info!(cloud = %CloudCover::from_mask(&masks.cloud).percent, "raster masked");

    println!(
        "Cloud and shadow detection completed. Output saved to {}.",
        output.display()
    );

    Ok(masks)
}

/// Write a synthetic fixture raster.
pub fn run_generate(params: &FixtureParams, output: &Path) -> Result<()> {
    generate::run(params, output)?;
    println!("{} generated successfully.", output.display());

    Ok(())
}
