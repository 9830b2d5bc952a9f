//! The network itself: a frozen pooling backbone followed by a dense head.

use crate::data::SampleShape;
use crate::error::MlError;
use crate::zoo::HeadKind;
use burn::module::Module;
use burn::nn::Linear;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use ndarray::{Array2, ArrayView2, ArrayView4};

/// Output grid of the backbone's adaptive pooling.
pub const DEFAULT_POOL_GRID: usize = 4;

/// Number of features the backbone emits for samples of `input` shape.
pub fn feature_dim(input: SampleShape) -> usize {
    input.channels * DEFAULT_POOL_GRID * DEFAULT_POOL_GRID
}

/// Backbone (parameter-free, hence frozen) and trainable head.
#[derive(Module, Debug)]
pub struct TransferNet<B: Backend> {
    backbone: AdaptiveAvgPool2d,
    head: Linear<B>,
}

impl<B: Backend> TransferNet<B> {
    pub fn new(input: SampleShape, head: HeadKind, num_classes: usize, device: &B::Device) -> Self {
        Self {
            backbone: AdaptiveAvgPool2dConfig::new([DEFAULT_POOL_GRID, DEFAULT_POOL_GRID]).init(),
            head: head.init(feature_dim(input), num_classes, device),
        }
    }

    /// `(batch, channels, height, width)` images to `(batch, classes)` logits.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features: Tensor<B, 2> = self.backbone.forward(images).flatten(1, 3);
        self.head.forward(features)
    }

    pub fn head(&self) -> &Linear<B> {
        &self.head
    }

    pub fn with_head(self, head: Linear<B>) -> Self {
        Self { head, ..self }
    }
}

/// Channels-last ndarray batch to a channels-first tensor.
pub fn image_tensor<B: Backend>(inputs: ArrayView4<'_, f32>, device: &B::Device) -> Tensor<B, 4> {
    let (batch, height, width, channels) = inputs.dim();
    let values: Vec<f32> = inputs.iter().copied().collect();
    Tensor::<B, 4>::from_floats(TensorData::new(values, [batch, height, width, channels]), device)
        .swap_dims(1, 3)
        .swap_dims(2, 3)
}

pub fn matrix_tensor<B: Backend>(values: ArrayView2<'_, f32>, device: &B::Device) -> Tensor<B, 2> {
    let (rows, cols) = values.dim();
    let values: Vec<f32> = values.iter().copied().collect();
    Tensor::<B, 2>::from_floats(TensorData::new(values, [rows, cols]), device)
}

/// Class index per row of one-hot (or probability) targets.
pub fn label_tensor<B: Backend>(targets: ArrayView2<'_, f32>, device: &B::Device) -> Tensor<B, 1, Int> {
    let labels: Vec<i64> = crate::data::argmax_rows(&targets.to_owned())
        .into_iter()
        .map(|label| label as i64)
        .collect();
    let len = labels.len();
    Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [len]), device)
}

pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, MlError> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| MlError::model(format!("reading tensor data: {e:?}")))
}

pub fn to_array2<B: Backend>(tensor: Tensor<B, 2>) -> Result<Array2<f32>, MlError> {
    let [rows, cols] = tensor.dims();
    Array2::from_shape_vec((rows, cols), to_vec(tensor)?).map_err(|e| MlError::model(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use ndarray::{Array4, array};

    type B = NdArray<f32>;

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let net = TransferNet::<B>::new(SampleShape::new(8, 6, 3), HeadKind::SimpleFc, 5, &device);
        let images = Array4::<f32>::ones((2, 8, 6, 3));
        let logits = net.forward(image_tensor::<B>(images.view(), &device));
        assert_eq!(logits.dims(), [2, 5]);
        assert_eq!(net.num_params(), feature_dim(SampleShape::new(8, 6, 3)) * 5 + 5);
    }

    #[test]
    fn test_image_tensor_moves_channels_first() {
        let device = Default::default();
        let mut images = Array4::<f32>::zeros((1, 2, 2, 3));
        images[[0, 1, 0, 2]] = 7.0;
        let tensor = image_tensor::<B>(images.view(), &device);
        assert_eq!(tensor.dims(), [1, 3, 2, 2]);
        let values = to_vec(tensor).unwrap();
        // channel 2, row 1, column 0
        assert_eq!(values[2 * 4 + 2], 7.0);
    }

    #[test]
    fn test_label_tensor_takes_argmax() {
        let device = Default::default();
        let labels = label_tensor::<B>(array![[0.0f32, 1.0], [1.0, 0.0], [0.2, 0.8]].view(), &device);
        let values = labels.into_data().to_vec::<i64>().unwrap();
        assert_eq!(values, vec![1, 0, 1]);
    }
}
