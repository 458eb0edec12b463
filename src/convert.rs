use crate::raster;
use crate::raster::BandSet;
use crate::raster::GeoTransform;
use anyhow::Context;
use anyhow::Result;
use image::ImageReader;
use image::RgbImage;
use image::imageops;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Split an RGB image into red, green and blue-as-NIR bands scaled to [0, 1].
pub fn bands_from_rgb(image: &RgbImage) -> Result<BandSet> {
    let (width, height) = image.dimensions();
    let channel = |c: usize| {
        Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            image.get_pixel(col as u32, row as u32).0[c] as f32 / 255.0
        })
    };

    Ok(BandSet::new(channel(0), channel(1), channel(2))?)
}

/// Resize the photo to `size`×`size` and write it to
/// `{output_dir}/{stem}_rgb_as_satellite.tif`, returning that path.
pub fn photo_to_raster(
    input: &Path,
    output_dir: &Path,
    size: u32,
    transform: &GeoTransform,
) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("no file name in {}", input.display()))?;
    let output = output_dir.join(format!("{stem}_rgb_as_satellite.tif"));

    let photo = ImageReader::open(input)
        .with_context(|| format!("opening {}", input.display()))?
        .decode()
        .with_context(|| format!("decoding {}", input.display()))?
        .into_rgb8();
    let resized = imageops::resize(&photo, size, size, imageops::FilterType::CatmullRom);

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    raster::write_bands(&output, &bands_from_rgb(&resized)?, transform)
        .with_context(|| format!("writing {}", output.display()))?;

    Ok(output)
}
