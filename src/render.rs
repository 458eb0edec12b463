use crate::mask::Masks;
use crate::raster::BandSet;
use anyhow::Result;
use image::Rgb;
use image::RgbImage;
use image::imageops;
use ndarray::Array2;
use std::path::Path;
use tracing::info;

/// Space around and between panels.
const MARGIN: u32 = 8;
const COLORBAR_WIDTH: u32 = 12;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    Gray,
    /// White to dark red.
    Reds,
    /// White to dark blue.
    Blues,
    /// Red through yellow to green, diverging around the midpoint.
    RdYlGn,
}

const GRAY_STOPS: &[[u8; 3]] = &[[0, 0, 0], [255, 255, 255]];

const REDS_STOPS: &[[u8; 3]] = &[
    [255, 245, 240],
    [254, 224, 210],
    [252, 187, 161],
    [252, 146, 114],
    [251, 106, 74],
    [239, 59, 44],
    [203, 24, 29],
    [165, 15, 21],
    [103, 0, 13],
];

const BLUES_STOPS: &[[u8; 3]] = &[
    [247, 251, 255],
    [222, 235, 247],
    [198, 219, 239],
    [158, 202, 225],
    [107, 174, 214],
    [66, 146, 198],
    [33, 113, 181],
    [8, 81, 156],
    [8, 48, 107],
];

const RDYLGN_STOPS: &[[u8; 3]] = &[
    [165, 0, 38],
    [215, 48, 39],
    [244, 109, 67],
    [253, 174, 97],
    [254, 224, 139],
    [255, 255, 191],
    [217, 239, 139],
    [166, 217, 106],
    [102, 189, 99],
    [26, 152, 80],
    [0, 104, 55],
];

impl Colormap {
    fn stops(&self) -> &'static [[u8; 3]] {
        match self {
            Colormap::Gray => GRAY_STOPS,
            Colormap::Reds => REDS_STOPS,
            Colormap::Blues => BLUES_STOPS,
            Colormap::RdYlGn => RDYLGN_STOPS,
        }
    }

    /// Map `x` on the interval [x_min, x_max] to an RGB colour.
    ///
    /// Returns `None` when `x` is outside the interval or not a number.
    pub fn to_rgb(&self, x: f64, x_min: f64, x_max: f64) -> Option<[u8; 3]> {
        if !(x >= x_min && x <= x_max) {
            return None;
        }

        let interval_width = x_max - x_min;
        let t = if interval_width > 0.0 {
            (x - x_min) / interval_width
        } else {
            0.0
        };

        let stops = self.stops();
        let position = t * (stops.len() - 1) as f64;
        let lower = (position.floor() as usize).min(stops.len() - 2);
        let frac = position - lower as f64;

        let (a, b) = (stops[lower], stops[lower + 1]);
        let mix = |i: usize| (a[i] as f64 + (b[i] as f64 - a[i] as f64) * frac).round() as u8;

        Some([mix(0), mix(1), mix(2)])
    }
}

/// Finite value range of a grid, widened when the grid is constant.
pub fn value_range(grid: &Array2<f32>) -> (f64, f64) {
    let (min, max) = grid
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v as f64), hi.max(v as f64))
        });

    if !min.is_finite() || !max.is_finite() {
        (0.0, 1.0)
    } else if max - min < f64::EPSILON {
        (min, min + 1.0)
    } else {
        (min, max)
    }
}

/// Render a grid scaled to its own range. Missing pixels are drawn white.
fn render_grid(grid: &Array2<f32>, colormap: Colormap) -> (RgbImage, (f64, f64)) {
    let (min, max) = value_range(grid);
    let (rows, cols) = grid.dim();

    let image = RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
        let value = grid[[y as usize, x as usize]] as f64;
        Rgb(colormap.to_rgb(value, min, max).unwrap_or(BACKGROUND.0))
    });

    (image, (min, max))
}

fn render_mask(mask: &Array2<bool>, colormap: Colormap) -> RgbImage {
    let (rows, cols) = mask.dim();
    let off = colormap.to_rgb(0.0, 0.0, 1.0).unwrap_or(BACKGROUND.0);
    let on = colormap.to_rgb(1.0, 0.0, 1.0).unwrap_or(BACKGROUND.0);

    RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
        if mask[[y as usize, x as usize]] {
            Rgb(on)
        } else {
            Rgb(off)
        }
    })
}

/// Vertical gradient from `max` at the top to `min` at the bottom.
fn colorbar(height: u32, colormap: Colormap, (min, max): (f64, f64)) -> RgbImage {
    let span = height.saturating_sub(1).max(1) as f64;

    RgbImage::from_fn(COLORBAR_WIDTH, height, |_, y| {
        let value = (max - (max - min) * (y as f64 / span)).clamp(min, max);
        Rgb(colormap.to_rgb(value, min, max).unwrap_or(BACKGROUND.0))
    })
}

/// Lay panels out left to right on a white canvas. A `None` entry inserts
/// a half margin, which keeps a colorbar close to its panel.
fn compose(panels: &[Option<RgbImage>]) -> RgbImage {
    let height = panels
        .iter()
        .flatten()
        .map(|panel| panel.height())
        .max()
        .unwrap_or(0);
    let width = panels.iter().fold(MARGIN, |width, panel| match panel {
        Some(panel) => width + panel.width() + MARGIN,
        None => width - MARGIN / 2,
    });

    let mut canvas = RgbImage::from_pixel(width, height + 2 * MARGIN, BACKGROUND);
    let mut x = MARGIN;
    for panel in panels {
        match panel {
            Some(panel) => {
                imageops::replace(&mut canvas, panel, x.into(), MARGIN.into());
                x += panel.width() + MARGIN;
            }
            None => x -= MARGIN / 2,
        }
    }

    canvas
}

/// NIR band in grayscale with its colorbar, then the cloud mask in reds and
/// the shadow mask in blues.
pub fn render_composite(bands: &BandSet, masks: &Masks) -> RgbImage {
    let (nir, range) = render_grid(bands.nir(), Colormap::Gray);
    let bar = colorbar(nir.height(), Colormap::Gray, range);

    compose(&[
        Some(nir),
        None,
        Some(bar),
        Some(render_mask(&masks.cloud, Colormap::Reds)),
        Some(render_mask(&masks.shadow, Colormap::Blues)),
    ])
}

/// NDVI on a diverging colormap with its colorbar.
pub fn render_ndvi(ndvi: &Array2<f32>) -> RgbImage {
    let (image, range) = render_grid(ndvi, Colormap::RdYlGn);
    let bar = colorbar(image.height(), Colormap::RdYlGn, range);

    compose(&[Some(image), None, Some(bar)])
}

/// Save an RGB image; the format is inferred from the file extension.
pub fn write_image(image: &RgbImage, path: &Path) -> Result<()> {
    image::save_buffer(
        path,
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    info!(path = %path.display(), "figure written");

    Ok(())
}
