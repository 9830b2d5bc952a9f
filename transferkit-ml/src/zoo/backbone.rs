//! Backbone capability table.
//!
//! Each supported backbone maps to its required input resolution and its
//! pixel preprocessing.

use crate::data::{PixelTransform, SampleShape};
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel preprocessing convention expected by a backbone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// RGB to BGR, then subtract the ImageNet channel means. No scaling.
    Caffe,
    /// Scale to `[-1, 1]`.
    Tf,
    /// Scale to `[0, 1]`, then standardize with the ImageNet mean and std.
    Torch,
}

const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];
const TORCH_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const TORCH_STD: [f32; 3] = [0.229, 0.224, 0.225];

impl Normalization {
    /// Normalize one pixel in place. Input values are raw `0..=255` in RGB order.
    pub fn apply(&self, pixel: &mut [f32]) {
        match self {
            Self::Caffe => {
                if pixel.len() == 3 {
                    pixel.swap(0, 2);
                }
                for (i, v) in pixel.iter_mut().enumerate() {
                    *v -= CAFFE_MEAN_BGR[i % 3];
                }
            }
            Self::Tf => {
                for v in pixel.iter_mut() {
                    *v = *v / 127.5 - 1.0;
                }
            }
            Self::Torch => {
                for (i, v) in pixel.iter_mut().enumerate() {
                    *v = (*v / 255.0 - TORCH_MEAN[i % 3]) / TORCH_STD[i % 3];
                }
            }
        }
    }
}

/// Supported backbones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackboneKind {
    #[serde(rename = "VGG16")]
    Vgg16,
    #[serde(rename = "VGG19")]
    Vgg19,
    InceptionV3,
    ResNet50,
    ResNet101,
    MobileNet,
    DenseNet121,
    Xception,
}

/// One row of the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackboneSpec {
    pub kind: BackboneKind,
    pub name: &'static str,
    /// Required input resolution as (height, width).
    pub input_size: (usize, usize),
    pub normalization: Normalization,
}

/// Rows are in `BackboneKind` declaration order.
pub const BACKBONES: [BackboneSpec; 8] = [
    BackboneSpec {
        kind: BackboneKind::Vgg16,
        name: "VGG16",
        input_size: (224, 224),
        normalization: Normalization::Caffe,
    },
    BackboneSpec {
        kind: BackboneKind::Vgg19,
        name: "VGG19",
        input_size: (224, 224),
        normalization: Normalization::Caffe,
    },
    BackboneSpec {
        kind: BackboneKind::InceptionV3,
        name: "InceptionV3",
        input_size: (299, 299),
        normalization: Normalization::Tf,
    },
    BackboneSpec {
        kind: BackboneKind::ResNet50,
        name: "ResNet50",
        input_size: (224, 224),
        normalization: Normalization::Caffe,
    },
    BackboneSpec {
        kind: BackboneKind::ResNet101,
        name: "ResNet101",
        input_size: (224, 224),
        normalization: Normalization::Caffe,
    },
    BackboneSpec {
        kind: BackboneKind::MobileNet,
        name: "MobileNet",
        input_size: (224, 224),
        normalization: Normalization::Tf,
    },
    BackboneSpec {
        kind: BackboneKind::DenseNet121,
        name: "DenseNet121",
        input_size: (224, 224),
        normalization: Normalization::Torch,
    },
    BackboneSpec {
        kind: BackboneKind::Xception,
        name: "Xception",
        input_size: (299, 299),
        normalization: Normalization::Tf,
    },
];

impl BackboneKind {
    pub fn spec(self) -> &'static BackboneSpec {
        &BACKBONES[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Input shape every sample must be resized to (always 3 channels).
    pub fn input_shape(self) -> SampleShape {
        let (height, width) = self.spec().input_size;
        SampleShape::new(height, width, 3)
    }

    pub fn pixel_transform(self) -> PixelTransform {
        PixelTransform::Backbone(self.spec().normalization)
    }

    pub fn supported_names() -> Vec<&'static str> {
        BACKBONES.iter().map(|b| b.name).collect()
    }
}

impl FromStr for BackboneKind {
    type Err = MlError;

    /// Case-insensitive lookup by table name.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        BACKBONES
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name.trim()))
            .map(|b| b.kind)
            .ok_or_else(|| {
                MlError::Config(format!(
                    "unknown backbone '{name}' (supported: {})",
                    Self::supported_names().join(", ")
                ))
            })
    }
}

impl fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
