//! Configuration types for the transferkit-ml crate.
//!
//! Loaded through `transferkit_core::config::load_config`, so every field has
//! a serde default and partial TOML files merge cleanly.

use crate::data::RemainderPolicy;
use crate::engine::OptimizerKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MlConfig {
    /// Model selection.
    #[serde(default)]
    pub model: ModelConfig,
    /// Training loop and callback settings.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Dataset and results locations.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Post-training evaluation passes.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Which head and backbone to assemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Head (cap model) name, e.g. `simple_fc`.
    #[serde(default = "default_name_model")]
    pub name_model: String,
    /// Backbone name, e.g. `VGG16`. Unset means raw pooled pixels.
    #[serde(default)]
    pub backbone: Option<String>,
    /// Saved model to reload in predict mode.
    #[serde(default)]
    pub weights: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name_model: default_name_model(),
            backbone: None,
            weights: None,
        }
    }
}

fn default_name_model() -> String {
    "simple_fc".to_string()
}

/// Training loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default)]
    pub optimizer: OptimizerKind,
    /// What to do with the trailing partial batch of each epoch.
    #[serde(default)]
    pub remainder: RemainderPolicy,
    #[serde(default = "default_true")]
    pub shuffle: bool,
    /// Seed for permutations and head initialization. Random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Epochs without `val_loss` improvement before the LR is reduced.
    #[serde(default = "default_reduce_lr_patience")]
    pub reduce_lr_patience: usize,
    #[serde(default = "default_reduce_lr_factor")]
    pub reduce_lr_factor: f64,
    /// Epochs without `val_loss` improvement before training stops.
    #[serde(default = "default_early_stopping_patience")]
    pub early_stopping_patience: usize,
    #[serde(default)]
    pub min_delta: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            optimizer: OptimizerKind::default(),
            remainder: RemainderPolicy::default(),
            shuffle: true,
            seed: None,
            reduce_lr_patience: default_reduce_lr_patience(),
            reduce_lr_factor: default_reduce_lr_factor(),
            early_stopping_patience: default_early_stopping_patience(),
            min_delta: 0.0,
        }
    }
}

fn default_epochs() -> usize {
    1
}

fn default_batch_size() -> usize {
    4
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_reduce_lr_patience() -> usize {
    25
}

fn default_reduce_lr_factor() -> f64 {
    0.1
}

fn default_early_stopping_patience() -> usize {
    15
}

/// Dataset and results locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,
    #[serde(default)]
    pub val_dataset: Option<PathBuf>,
    #[serde(default)]
    pub test_dataset: Option<PathBuf>,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset_dir: default_dataset_dir(),
            val_dataset: None,
            test_dataset: None,
            results_dir: default_results_dir(),
        }
    }
}

fn default_dataset_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Which partitions to evaluate after training.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub eval_val_set: bool,
    #[serde(default)]
    pub eval_train_set: bool,
    /// Compute ROC curves and AUC for each evaluated partition.
    #[serde(default)]
    pub analyze_data: bool,
}

fn default_true() -> bool {
    true
}
