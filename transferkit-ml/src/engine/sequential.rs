//! Frozen backbone followed by a trainable head.

use crate::data::{ClassIndex, DEFAULT_TARGET_SHAPE, SampleShape};
use crate::engine::network::{image_tensor, label_tensor, matrix_tensor, to_array2, to_vec};
use crate::engine::{
    ClassifierModel, HeadOptimizer, InferenceBackend, ModelSpec, ModelWeights, NamedTensor, SAVED_MODEL_VERSION,
    SavedModel, TrainBackend, TransferNet, feature_dim,
};
use crate::error::MlError;
use burn::backend::ndarray::NdArrayDevice;
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::GradientsParams;
use burn::record::{DefaultFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::{Array2, ArrayView2, ArrayView4};
use sha2::{Digest, Sha256};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::debug;

const WEIGHT: &str = "head/weight";
const BIAS: &str = "head/bias";

/// Extension burn's default file recorder writes.
const WEIGHTS_EXTENSION: &str = "mpk";

type Recorder = DefaultFileRecorder<FullPrecisionSettings>;

/// The built-in classifier.
pub struct SequentialModel {
    spec: ModelSpec,
    input: SampleShape,
    device: NdArrayDevice,
    net: TransferNet<TrainBackend>,
    loss: CrossEntropyLoss<TrainBackend>,
    optimizer: Box<dyn HeadOptimizer>,
}

impl fmt::Debug for SequentialModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialModel")
            .field("spec", &self.spec)
            .field("input", &self.input)
            .field("net", &self.net)
            .finish_non_exhaustive()
    }
}

impl SequentialModel {
    /// Build a fresh model: frozen backbone, randomly initialized head.
    pub fn assemble(spec: ModelSpec, seed: Option<u64>) -> Result<Self, MlError> {
        if spec.num_classes() == 0 {
            return Err(MlError::model("cannot assemble a classifier with zero classes"));
        }
        if let Some(seed) = seed {
            TrainBackend::seed(seed);
        }
        let device = NdArrayDevice::default();
        let input = spec.backbone.map_or(DEFAULT_TARGET_SHAPE, |b| b.input_shape());
        let net = TransferNet::new(input, spec.head, spec.num_classes(), &device);
        debug!(
            backbone = ?spec.backbone,
            head = %spec.head,
            features = feature_dim(input),
            classes = spec.num_classes(),
            optimizer = %spec.optimizer,
            "Assembled model"
        );
        Ok(Self {
            loss: CrossEntropyLossConfig::new().init(&device),
            optimizer: spec.optimizer.build(),
            spec,
            input,
            device,
            net,
        })
    }

    /// Reload a model written by [`ClassifierModel::save`].
    pub fn load(path: &Path) -> Result<Self, MlError> {
        let saved: SavedModel = transferkit_core::load_json(path)?
            .ok_or_else(|| MlError::not_found(format!("saved model {}", path.display())))?;
        if saved.format_version != SAVED_MODEL_VERSION {
            return Err(MlError::model(format!(
                "{} has format version {}, expected {SAVED_MODEL_VERSION}",
                path.display(),
                saved.format_version
            )));
        }
        let weights_path = path.with_file_name(&saved.weights_file);
        if !weights_path.exists() {
            return Err(MlError::not_found(format!("model weights {}", weights_path.display())));
        }
        if sha256_file(&weights_path)? != saved.weights_sha256 {
            return Err(MlError::model(format!(
                "{} does not match the checksum recorded in {}",
                weights_path.display(),
                path.display()
            )));
        }

        let mut model = Self::assemble(saved.spec, None)?;
        model.net = model
            .net
            .clone()
            .load_file(weights_path.clone(), &Recorder::new(), &model.device)
            .map_err(|e| MlError::model(format!("loading {}: {e:?}", weights_path.display())))?;
        Ok(model)
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn check_batch(&self, inputs: &ArrayView4<'_, f32>) -> Result<(), MlError> {
        if inputs.shape()[0] == 0 {
            return Err(MlError::invalid_input("empty batch"));
        }
        if inputs.shape()[1..] != self.input.dims() {
            return Err(MlError::model(format!(
                "model expects samples of shape {:?}, got {:?}",
                self.input.dims(),
                &inputs.shape()[1..]
            )));
        }
        Ok(())
    }

    fn backbone_name(&self) -> &'static str {
        self.spec.backbone.map_or("none", |b| b.name())
    }
}

/// Weights file written next to a manifest at `path`.
fn weights_path_for(path: &Path) -> PathBuf {
    path.with_extension(WEIGHTS_EXTENSION)
}

fn sha256_file(path: &Path) -> Result<String, MlError> {
    let bytes = std::fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

impl ClassifierModel for SequentialModel {
    fn num_classes(&self) -> usize {
        self.spec.num_classes()
    }

    fn input_shape(&self) -> SampleShape {
        self.input
    }

    fn class_names(&self) -> &ClassIndex {
        &self.spec.class_names
    }

    fn train_on_batch(
        &mut self,
        inputs: ArrayView4<'_, f32>,
        targets: ArrayView2<'_, f32>,
    ) -> Result<Array2<f32>, MlError> {
        self.check_batch(&inputs)?;
        if targets.dim() != (inputs.shape()[0], self.num_classes()) {
            return Err(MlError::training(format!(
                "targets have shape {:?}, expected ({}, {})",
                targets.shape(),
                inputs.shape()[0],
                self.num_classes()
            )));
        }

        let images = image_tensor::<TrainBackend>(inputs, &self.device);
        let labels = label_tensor::<TrainBackend>(targets, &self.device);
        let logits = self.net.forward(images);
        let probs = softmax(logits.clone(), 1);
        let loss = self.loss.forward(logits, labels);
        let grads = GradientsParams::from_grads(loss.backward(), &self.net);
        self.net = self.optimizer.apply(self.spec.learning_rate, self.net.clone(), grads);
        to_array2(probs)
    }

    fn predict_on_batch(&self, inputs: ArrayView4<'_, f32>) -> Result<Array2<f32>, MlError> {
        self.check_batch(&inputs)?;
        let net = self.net.valid();
        let images = image_tensor::<InferenceBackend>(inputs, &self.device);
        to_array2(softmax(net.forward(images), 1))
    }

    fn learning_rate(&self) -> f64 {
        self.spec.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.spec.learning_rate = lr;
    }

    fn weights(&self) -> Result<ModelWeights, MlError> {
        let head = self.net.head();
        let weight = head.weight.val();
        let bias = head
            .bias
            .as_ref()
            .map(|b| b.val())
            .ok_or_else(|| MlError::model("head has no bias"))?;
        Ok(ModelWeights {
            tensors: vec![
                NamedTensor {
                    name: WEIGHT.to_string(),
                    shape: weight.dims().to_vec(),
                    values: to_vec(weight)?,
                },
                NamedTensor {
                    name: BIAS.to_string(),
                    shape: bias.dims().to_vec(),
                    values: to_vec(bias)?,
                },
            ],
        })
    }

    fn set_weights(&mut self, weights: &ModelWeights) -> Result<(), MlError> {
        let get = |name: &str| {
            weights
                .get(name)
                .ok_or_else(|| MlError::model(format!("weights are missing '{name}'")))
        };
        let (weight, bias) = (get(WEIGHT)?, get(BIAS)?);

        let expected = [feature_dim(self.input), self.num_classes()];
        if weight.shape != expected || weight.values.len() != expected[0] * expected[1] {
            return Err(MlError::model(format!(
                "'{WEIGHT}' has shape {:?}, model expects {expected:?}",
                weight.shape
            )));
        }
        if bias.shape != [expected[1]] || bias.values.len() != expected[1] {
            return Err(MlError::model(format!(
                "'{BIAS}' has shape {:?}, model expects [{}]",
                bias.shape, expected[1]
            )));
        }

        let weight = Array2::from_shape_vec((expected[0], expected[1]), weight.values.clone())
            .map_err(|e| MlError::model(format!("'{WEIGHT}': {e}")))?;
        let weight = matrix_tensor::<TrainBackend>(weight.view(), &self.device).require_grad();
        let bias = Tensor::<TrainBackend, 1>::from_floats(TensorData::new(bias.values.clone(), [expected[1]]), &self.device)
            .require_grad();

        let mut head = self.net.head().clone();
        head.weight = head.weight.map(|_| weight);
        head.bias = head.bias.map(|b| b.map(|_| bias));
        self.net = self.net.clone().with_head(head);
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<(), MlError> {
        let weights_path = weights_path_for(path);
        if let Some(parent) = path.parent() {
            transferkit_core::ensure_dir(parent)?;
        }
        self.net
            .clone()
            .valid()
            .save_file(weights_path.clone(), &Recorder::new())
            .map_err(|e| MlError::model(format!("saving {}: {e:?}", weights_path.display())))?;

        let weights_file = weights_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| MlError::model(format!("invalid model path {}", path.display())))?;
        let saved = SavedModel {
            format_version: SAVED_MODEL_VERSION,
            spec: self.spec.clone(),
            weights_sha256: sha256_file(&weights_path)?,
            weights_file,
        };
        transferkit_core::atomic_write_json(path, &saved)?;
        Ok(())
    }

    fn summary(&self) -> String {
        let params = self.net.num_params();
        let mut out = String::new();
        let _ = writeln!(out, "Model: \"{}\"", self.spec.experiment_id);
        let _ = writeln!(out, "{:<28} {:<16} {:>10}", "Layer", "Output shape", "Params");
        let _ = writeln!(
            out,
            "{:<28} {:<16} {:>10}",
            "input",
            format!("({}, {}, {})", self.input.height, self.input.width, self.input.channels),
            0
        );
        let _ = writeln!(
            out,
            "{:<28} {:<16} {:>10}",
            format!("backbone ({}, frozen)", self.backbone_name()),
            format!("({})", feature_dim(self.input)),
            0
        );
        let _ = writeln!(
            out,
            "{:<28} {:<16} {:>10}",
            format!("head ({})", self.spec.head),
            format!("({})", self.num_classes()),
            params
        );
        let _ = writeln!(out, "Trainable params: {params}");
        let _ = write!(
            out,
            "Optimizer: {} (learning rate {})",
            self.spec.optimizer, self.spec.learning_rate
        );
        out
    }
}
