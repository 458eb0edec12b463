use chrono::prelude::*;
use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;
use std::{
    fs::File,
    io::{Cursor, Read, Seek, Write},
    path::Path,
};
use thiserror::Error;
use tiff::TiffError;
use tiff::decoder::Decoder;
use tiff::decoder::DecodingResult;
use tiff::encoder::TiffEncoder;
use tiff::encoder::colortype::RGB32Float;
use tiff::tags::Tag;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Scale used when raw digital numbers are stored in the range [0, 10000].
pub const DEFAULT_SCALE: f32 = 10000.0;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shape mismatch or conversion error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("expected at least 3 bands, found {found}")]
    MissingBands { found: usize },

    #[error("band {band} is {got:?} but red is {expected:?}")]
    DimensionMismatch {
        band: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("unsupported pixel format in TIFF")]
    UnsupportedPixelFormat,

    #[error("strip data runs past the end of the file")]
    Truncated,
}

pub type Result<T> = std::result::Result<T, RasterError>;

/// Affine placement of the grid: origin of the top-left corner plus the
/// size of one pixel. Carried through the pipeline but never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with the top-left corner at `(west, north)`.
    pub fn from_origin(west: f64, north: f64, x_size: f64, y_size: f64) -> Self {
        Self {
            origin_x: west,
            origin_y: north,
            pixel_width: x_size,
            pixel_height: -y_size,
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::from_origin(0.0, 0.0, 1.0, 1.0)
    }
}

/// How raw band values are brought into a reflectance-like range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// Divide each band by its own maximum.
    ///
    /// A band that is zero everywhere divides by zero and yields NaN, which
    /// fails every threshold comparison downstream.
    PerBandMax,
    /// Divide every band by the same constant.
    FixedScale { scale: f32 },
}

impl Normalization {
    pub fn fixed_scale() -> Self {
        Self::FixedScale {
            scale: DEFAULT_SCALE,
        }
    }
}

/// Red, green and near-infrared grids of one image. All three share a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct BandSet {
    red: Array2<f32>,
    green: Array2<f32>,
    nir: Array2<f32>,
}

impl BandSet {
    pub fn new(red: Array2<f32>, green: Array2<f32>, nir: Array2<f32>) -> Result<Self> {
        let expected = red.dim();
        for (band, grid) in [("green", &green), ("nir", &nir)] {
            if grid.dim() != expected {
                return Err(RasterError::DimensionMismatch {
                    band,
                    expected,
                    got: grid.dim(),
                });
            }
        }

        Ok(Self { red, green, nir })
    }

    pub fn red(&self) -> &Array2<f32> {
        &self.red
    }

    pub fn green(&self) -> &Array2<f32> {
        &self.green
    }

    pub fn nir(&self) -> &Array2<f32> {
        &self.nir
    }

    /// (rows, cols) of every band.
    pub fn dim(&self) -> (usize, usize) {
        self.red.dim()
    }

    pub fn normalized(self, normalization: Normalization) -> Self {
        match normalization {
            Normalization::PerBandMax => Self {
                red: divide_by_max("red", self.red),
                green: divide_by_max("green", self.green),
                nir: divide_by_max("nir", self.nir),
            },
            Normalization::FixedScale { scale } => Self {
                red: self.red / scale,
                green: self.green / scale,
                nir: self.nir / scale,
            },
        }
    }
}

fn divide_by_max(name: &str, band: Array2<f32>) -> Array2<f32> {
    let max = band.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == 0.0 {
        warn!(band = name, "band maximum is zero, normalized values will be NaN");
    }
    band / max
}

/// Read the first three bands of a raster file and normalize them.
///
/// Every IFD contributes one band per sample, so both one-band-per-page
/// files and single-page files with several samples per pixel are read.
pub fn read_bands<P: AsRef<Path>>(
    path: P,
    normalization: Normalization,
) -> Result<(BandSet, GeoTransform)> {
    let data = std::fs::read(path.as_ref())?;
    let (bands, transform) = decode_bands(&data)?;
    debug!(path = %path.as_ref().display(), dim = ?bands.dim(), "read bands");

    Ok((bands.normalized(normalization), transform))
}

fn decode_bands(data: &[u8]) -> Result<(BandSet, GeoTransform)> {
    let mut decoder = Decoder::new(Cursor::new(data))?;
    let transform = read_geotransform(&mut decoder).unwrap_or_default();
    let mut bands: Vec<Array2<f32>> = Vec::new();

    loop {
        let (width, height) = decoder.dimensions()?;
        let (rows, cols) = (height as usize, width as usize);
        let pixels = rows * cols;
        if pixels == 0 {
            return Err(RasterError::UnsupportedPixelFormat);
        }

        let buf = match decoder.colortype() {
            Ok(_) => decoded_samples(decoder.read_image()?)?,
            // Grayscale with three or more samples, as GDAL writes multiband
            // rasters, has no colour type in the decoder.
            Err(TiffError::UnsupportedError(_)) => raw_samples(&mut decoder, data, pixels)?,
            Err(err) => return Err(err.into()),
        };

        if buf.len() % pixels != 0 {
            return Err(RasterError::UnsupportedPixelFormat);
        }

        // Chunky layouts interleave every sample of a pixel.
        let samples = buf.len() / pixels;
        for sample in 0..samples {
            let band: Vec<f32> = buf.iter().skip(sample).step_by(samples).copied().collect();
            bands.push(Array2::from_shape_vec((rows, cols), band)?);
        }

        if decoder.more_images() {
            decoder.next_image()?;
        } else {
            break;
        }
    }

    let found = bands.len();
    let mut bands = bands.into_iter();
    match (bands.next(), bands.next(), bands.next()) {
        (Some(red), Some(green), Some(nir)) => Ok((BandSet::new(red, green, nir)?, transform)),
        _ => Err(RasterError::MissingBands { found }),
    }
}

fn decoded_samples(result: DecodingResult) -> Result<Vec<f32>> {
    Ok(match result {
        DecodingResult::U8(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        _ => return Err(RasterError::UnsupportedPixelFormat),
    })
}

/// Pixel-interleaved samples of the current IFD, read straight from its
/// strips. Only uncompressed, chunky, stripped images are supported.
fn raw_samples<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    data: &[u8],
    pixels: usize,
) -> Result<Vec<f32>> {
    let compression = decoder.get_tag_u32(Tag::Compression).unwrap_or(1);
    let planar = decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1);
    if compression != 1 || planar != 1 {
        return Err(RasterError::UnsupportedPixelFormat);
    }

    let samples = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;
    let bits = decoder.get_tag_u32_vec(Tag::BitsPerSample)?;
    let format = decoder
        .get_tag_u32_vec(Tag::SampleFormat)
        .ok()
        .and_then(|formats| formats.first().copied())
        .unwrap_or(1);
    let width = match bits.first() {
        Some(&bits) if bits % 8 == 0 && bits > 0 => bits as usize / 8,
        _ => return Err(RasterError::UnsupportedPixelFormat),
    };

    let offsets = decoder.get_tag_u64_vec(Tag::StripOffsets)?;
    let counts = decoder.get_tag_u64_vec(Tag::StripByteCounts)?;
    let mut raw = Vec::with_capacity(pixels * samples * width);
    for (&offset, &count) in offsets.iter().zip(counts.iter()) {
        let start = offset as usize;
        let strip = data
            .get(start..start + count as usize)
            .ok_or(RasterError::Truncated)?;
        raw.extend_from_slice(strip);
    }

    let expected = pixels * samples * width;
    if raw.len() < expected {
        return Err(RasterError::Truncated);
    }
    raw.truncate(expected);

    let little_endian = data.starts_with(b"II");
    raw.chunks_exact(width)
        .map(|bytes| sample_to_f32(bytes, format, little_endian))
        .collect::<Option<Vec<f32>>>()
        .ok_or(RasterError::UnsupportedPixelFormat)
}

/// One sample of the given SampleFormat (1 unsigned, 2 signed, 3 float).
fn sample_to_f32(bytes: &[u8], format: u32, little_endian: bool) -> Option<f32> {
    macro_rules! read {
        ($t:ty) => {{
            let bytes = bytes.try_into().ok()?;
            if little_endian {
                <$t>::from_le_bytes(bytes)
            } else {
                <$t>::from_be_bytes(bytes)
            }
        }};
    }

    Some(match (format, bytes.len()) {
        (1, 1) => bytes[0] as f32,
        (2, 1) => bytes[0] as i8 as f32,
        (1, 2) => read!(u16) as f32,
        (2, 2) => read!(i16) as f32,
        (1, 4) => read!(u32) as f32,
        (2, 4) => read!(i32) as f32,
        (3, 4) => read!(f32),
        (3, 8) => read!(f64) as f32,
        _ => return None,
    })
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    Some(GeoTransform {
        origin_x: tiepoint[3] - tiepoint[0] * scale[0],
        origin_y: tiepoint[4] + tiepoint[1] * scale[1],
        pixel_width: scale[0],
        pixel_height: -scale[1],
    })
}

/// Write the bands as a single-IFD float32 GeoTIFF with three samples per
/// pixel in the order red, green, nir.
pub fn write_bands<P: AsRef<Path>>(
    path: P,
    bands: &BandSet,
    transform: &GeoTransform,
) -> Result<()> {
    let file = File::create(path.as_ref())?;
    encode_bands(file, bands, transform)?;
    info!(path = %path.as_ref().display(), "raster written");

    Ok(())
}

fn encode_bands<W: Write + Seek>(
    writer: W,
    bands: &BandSet,
    transform: &GeoTransform,
) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    let (rows, cols) = bands.dim();
    let stamp = Local::now().format("%Y:%m:%d %H:%M:%S").to_string();

    let mut image = encoder.new_image::<RGB32Float>(cols as u32, rows as u32)?;
    image.encoder().write_tag(Tag::DateTime, stamp.as_str())?;

    let scale = [transform.pixel_width, transform.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;

    // Version 1.1.0 with two keys: projected model, pixel is area.
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;

    let data: Vec<f32> = bands
        .red()
        .iter()
        .zip(bands.green().iter())
        .zip(bands.nir().iter())
        .flat_map(|((&r, &g), &n)| [r, g, n])
        .collect();
    image.write_data(&data)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tiff::ColorType;
    use tiff::encoder::colortype::Gray32Float;

    /// Little-endian single-strip TIFF holding `pixels` as a grayscale image
    /// with three float32 samples per pixel and two unspecified extra samples.
    fn minisblack_three_sample(width: u16, height: u16, pixels: &[f32]) -> Vec<u8> {
        const SHORT: u16 = 3;
        const LONG: u16 = 4;
        const ENTRIES: u16 = 12;
        let ifd_end = 8 + 2 + 12 * ENTRIES as u32 + 4;
        let bits_at = ifd_end;
        let format_at = bits_at + 6;
        let data_at = format_at + 6;
        let data_len = (pixels.len() * 4) as u32;

        let mut out = Vec::new();
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&8u32.to_le_bytes());
        out.extend_from_slice(&ENTRIES.to_le_bytes());

        let mut entry = |tag: u16, kind: u16, count: u32, value: u32| {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&kind.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
        };
        entry(256, SHORT, 1, width.into());
        entry(257, SHORT, 1, height.into());
        entry(258, SHORT, 3, bits_at);
        entry(259, SHORT, 1, 1);
        entry(262, SHORT, 1, 1);
        entry(273, LONG, 1, data_at);
        entry(277, SHORT, 1, 3);
        entry(278, SHORT, 1, height.into());
        entry(279, LONG, 1, data_len);
        entry(284, SHORT, 1, 1);
        // ExtraSamples [0, 0] fits inline.
        entry(338, SHORT, 2, 0);
        entry(339, SHORT, 3, format_at);
        out.extend_from_slice(&0u32.to_le_bytes());

        for _ in 0..3 {
            out.extend_from_slice(&32u16.to_le_bytes());
        }
        for _ in 0..3 {
            out.extend_from_slice(&3u16.to_le_bytes());
        }
        for value in pixels {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    fn bands() -> BandSet {
        BandSet::new(
            array![[0.0, 5000.0], [10000.0, 2500.0]],
            array![[1.0, 2.0], [3.0, 4.0]],
            array![[9999.0, 0.5], [7.0, 8.0]],
        )
        .unwrap()
    }

    #[test]
    fn rejects_mismatched_bands() {
        let err = BandSet::new(
            Array2::zeros((2, 2)),
            Array2::zeros((2, 3)),
            Array2::zeros((2, 2)),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            RasterError::DimensionMismatch { band: "green", .. }
        ));
    }

    #[test]
    fn fixed_scale_divides_every_band() {
        let scaled = bands().normalized(Normalization::fixed_scale());
        assert_eq!(scaled.red(), &array![[0.0, 0.5], [1.0, 0.25]]);
    }

    #[test]
    fn per_band_max_scales_each_band_to_one() {
        let scaled = bands().normalized(Normalization::PerBandMax);
        assert_eq!(scaled.red()[[1, 0]], 1.0);
        assert_eq!(scaled.green()[[1, 1]], 1.0);
        assert_eq!(scaled.nir()[[0, 0]], 1.0);
    }

    #[test]
    fn per_band_max_of_zero_band_is_nan() {
        let zero = BandSet::new(
            Array2::zeros((2, 2)),
            Array2::ones((2, 2)),
            Array2::ones((2, 2)),
        )
        .unwrap();

        let scaled = zero.normalized(Normalization::PerBandMax);
        assert!(scaled.red().iter().all(|v| v.is_nan()));
        assert!(scaled.green().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.tif");
        let transform = GeoTransform::from_origin(100.0, 200.0, 10.0, 10.0);

        write_bands(&path, &bands(), &transform).unwrap();
        let (read, read_transform) = read_bands(&path, Normalization::fixed_scale()).unwrap();

        assert_eq!(read, bands().normalized(Normalization::fixed_scale()));
        assert_eq!(read_transform, transform);
    }

    #[test]
    fn writes_one_ifd_with_three_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.tif");
        write_bands(&path, &bands(), &GeoTransform::default()).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.colortype().unwrap(), ColorType::RGB(32));
        assert_eq!(decoder.dimensions().unwrap(), (2, 2));
        assert!(!decoder.more_images());
    }

    #[test]
    fn splits_interleaved_samples_into_bands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunky.tif");

        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        encoder
            .write_image::<RGB32Float>(2, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        drop(encoder);

        let (read, _) = read_bands(&path, Normalization::FixedScale { scale: 1.0 }).unwrap();
        assert_eq!(read.red(), &array![[1.0, 4.0]]);
        assert_eq!(read.green(), &array![[2.0, 5.0]]);
        assert_eq!(read.nir(), &array![[3.0, 6.0]]);
    }

    #[test]
    fn reads_grayscale_three_sample_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multiband.tif");
        let pixels: Vec<f32> = (0..12).map(|v| v as f32 * 100.0).collect();
        std::fs::write(&path, minisblack_three_sample(2, 2, &pixels)).unwrap();

        let (read, transform) = read_bands(&path, Normalization::fixed_scale()).unwrap();

        assert_eq!(read.red(), &array![[0.0, 0.03], [0.06, 0.09]]);
        assert_eq!(read.green(), &array![[0.01, 0.04], [0.07, 0.1]]);
        assert_eq!(read.nir(), &array![[0.02, 0.05], [0.08, 0.11]]);
        assert_eq!(transform, GeoTransform::default());
    }

    #[test]
    fn truncated_strip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.tif");
        let mut bytes = minisblack_three_sample(2, 2, &[1.0; 12]);
        bytes.truncate(bytes.len() - 8);
        std::fs::write(&path, bytes).unwrap();

        let err = read_bands(&path, Normalization::fixed_scale()).unwrap_err();
        assert!(matches!(err, RasterError::Truncated));
    }

    #[test]
    fn reads_one_band_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.tif");

        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        for value in [1.0, 2.0, 3.0] {
            encoder
                .write_image::<Gray32Float>(2, 1, &[value, value])
                .unwrap();
        }
        drop(encoder);

        let (read, _) = read_bands(&path, Normalization::FixedScale { scale: 1.0 }).unwrap();
        assert_eq!(read.red(), &array![[1.0, 1.0]]);
        assert_eq!(read.nir(), &array![[3.0, 3.0]]);
    }

    #[test]
    fn fails_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_bands(dir.path().join("absent.tif"), Normalization::PerBandMax);
        assert!(matches!(err, Err(RasterError::Io(_))));
    }

    #[test]
    fn fails_with_fewer_than_three_bands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.tif");

        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        encoder
            .write_image::<Gray32Float>(2, 2, &[0.0, 1.0, 2.0, 3.0])
            .unwrap();
        drop(encoder);

        let err = read_bands(&path, Normalization::fixed_scale()).unwrap_err();
        assert!(matches!(err, RasterError::MissingBands { found: 1 }));
    }
}
