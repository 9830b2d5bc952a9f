//! Model engine seam.
//!
//! The training loop and evaluation only ever see [`ClassifierModel`]. The
//! built-in engine is a burn [`TransferNet`]: adaptive average pooling as the
//! frozen backbone and a dense head, trained on the autodiff ndarray backend.

pub mod network;
pub mod optimizer;
pub mod sequential;

pub use network::{DEFAULT_POOL_GRID, TransferNet, feature_dim};
pub use optimizer::{HeadOptimizer, OptimizerKind};
pub use sequential::SequentialModel;

use crate::data::{ClassIndex, SampleShape};
use crate::error::MlError;
use crate::zoo::{BackboneKind, HeadKind};
use burn::backend::{Autodiff, NdArray};
use ndarray::{Array2, ArrayView2, ArrayView4};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub type InferenceBackend = NdArray<f32>;
pub type TrainBackend = Autodiff<InferenceBackend>;

/// A trainable classifier producing per-class probabilities.
pub trait ClassifierModel: Send {
    fn num_classes(&self) -> usize;

    fn input_shape(&self) -> SampleShape;

    /// Class names in label order.
    fn class_names(&self) -> &ClassIndex;

    /// One optimizer step on a batch. Returns the probabilities computed
    /// before the update, so callers can accumulate epoch metrics.
    fn train_on_batch(
        &mut self,
        inputs: ArrayView4<'_, f32>,
        targets: ArrayView2<'_, f32>,
    ) -> Result<Array2<f32>, MlError>;

    fn predict_on_batch(&self, inputs: ArrayView4<'_, f32>) -> Result<Array2<f32>, MlError>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);

    /// Snapshot of the trainable tensors.
    fn weights(&self) -> Result<ModelWeights, MlError>;

    fn set_weights(&mut self, weights: &ModelWeights) -> Result<(), MlError>;

    /// Persist architecture and weights so the model can be reloaded.
    fn save(&self, path: &Path) -> Result<(), MlError>;

    /// Layer table for logs.
    fn summary(&self) -> String;
}

/// A named, flat, row-major tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// Trainable tensors of a model, in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub tensors: Vec<NamedTensor>,
}

impl ModelWeights {
    pub fn get(&self, name: &str) -> Option<&NamedTensor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    pub fn num_params(&self) -> usize {
        self.tensors.iter().map(|t| t.values.len()).sum()
    }
}

/// Everything needed to rebuild a model before loading its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub head: HeadKind,
    #[serde(default)]
    pub backbone: Option<BackboneKind>,
    pub class_names: ClassIndex,
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    pub experiment_id: String,
}

impl ModelSpec {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }
}

/// Model manifest (`*_model.json`, `*_model.ckpt.json`). The weights live
/// next to it in a burn record file named by `weights_file`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub format_version: u32,
    pub spec: ModelSpec,
    pub weights_file: String,
    pub weights_sha256: String,
}

pub const SAVED_MODEL_VERSION: u32 = 2;
