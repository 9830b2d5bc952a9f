//! Turning sample files into `(height, width, channels)` arrays.

use crate::data::sample::{SampleId, SampleKind};
use crate::error::MlError;
use crate::zoo::Normalization;
use image::imageops::FilterType;
use ndarray::{Array3, ArrayD};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Target sample shape, channels last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl SampleShape {
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }
}

/// Pixel transform applied to decoded images. Raw pixel values are in `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelTransform {
    /// Divide by 255 so values land in `[0, 1]`.
    UnitScale,
    /// Backbone-specific preprocessing.
    Backbone(Normalization),
}

impl PixelTransform {
    /// Transform one pixel in place; `pixel` holds the channel values in RGB order.
    pub fn apply(&self, pixel: &mut [f32]) {
        match self {
            Self::UnitScale => pixel.iter_mut().for_each(|v| *v /= 255.0),
            Self::Backbone(norm) => norm.apply(pixel),
        }
    }
}

/// Load one sample as an array of exactly `shape`.
pub fn load_sample(
    sample: &SampleId,
    shape: SampleShape,
    transform: PixelTransform,
) -> Result<Array3<f32>, MlError> {
    match sample.kind() {
        SampleKind::Image => load_image(sample.path(), shape, transform),
        SampleKind::FeatureArray => load_feature_array(sample.path(), shape),
    }
}

/// Decode an image, convert it to `shape.channels` channels, resize it and
/// apply `transform`.
pub fn load_image(
    path: &Path,
    shape: SampleShape,
    transform: PixelTransform,
) -> Result<Array3<f32>, MlError> {
    let img = image::ImageReader::open(path)
        .map_err(|e| MlError::decode(path, e))?
        .with_guessed_format()
        .map_err(|e| MlError::decode(path, e))?
        .decode()
        .map_err(|e| MlError::decode(path, e))?;

    let resized = img.resize_exact(shape.width as u32, shape.height as u32, FilterType::Triangle);
    let raw: Vec<u8> = match shape.channels {
        3 => resized.to_rgb8().into_raw(),
        1 => resized.to_luma8().into_raw(),
        other => {
            return Err(MlError::invalid_input(format!(
                "images can be loaded with 1 or 3 channels, not {other}"
            )));
        }
    };

    let mut data: Vec<f32> = raw.into_iter().map(f32::from).collect();
    for pixel in data.chunks_exact_mut(shape.channels) {
        transform.apply(pixel);
    }

    Array3::from_shape_vec(shape.dims(), data).map_err(|e| MlError::decode(path, e))
}

/// Load a precomputed feature array.
///
/// `.npy` arrays must be flat or exactly `(height, width, channels)`;
/// `.csv` files are headerless numeric text read row-major, so only the
/// element count has to match.
pub fn load_feature_array(path: &Path, shape: SampleShape) -> Result<Array3<f32>, MlError> {
    let is_npy = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("npy"));

    let (found, values) = if is_npy {
        let array = read_npy_f32(path)?;
        let found = array.shape().to_vec();
        let flat_ok = found.len() == 1 && found[0] == shape.len();
        if !flat_ok && found != shape.dims() {
            return Err(MlError::ShapeMismatch {
                path: path.to_path_buf(),
                expected: shape.dims().to_vec(),
                found,
            });
        }
        (found, array.iter().copied().collect::<Vec<f32>>())
    } else {
        let values = read_numeric_csv(path)?;
        (vec![values.len()], values)
    };

    if values.len() != shape.len() {
        return Err(MlError::ShapeMismatch {
            path: path.to_path_buf(),
            expected: shape.dims().to_vec(),
            found,
        });
    }

    Array3::from_shape_vec(shape.dims(), values).map_err(|e| MlError::dataset(e.to_string()))
}

fn read_npy_f32(path: &Path) -> Result<ArrayD<f32>, MlError> {
    match ndarray_npy::read_npy::<_, ArrayD<f32>>(path) {
        Ok(array) => Ok(array),
        // numpy defaults to float64; accept it and narrow.
        Err(_) => {
            let wide: ArrayD<f64> = ndarray_npy::read_npy(path)?;
            Ok(wide.mapv(|v| v as f32))
        }
    }
}

fn read_numeric_csv(path: &Path) -> Result<Vec<f32>, MlError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for (col, field) in record.iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            let value = field.parse::<f32>().map_err(|_| {
                MlError::dataset(format!(
                    "{}: non-numeric value '{field}' at row {}, column {}",
                    path.display(),
                    row + 1,
                    col + 1
                ))
            })?;
            values.push(value);
        }
    }
    Ok(values)
}
