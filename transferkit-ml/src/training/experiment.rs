//! Training experiment identity and the `experiment.json` manifest.

use crate::data::RemainderPolicy;
use crate::engine::OptimizerKind;
use crate::error::MlError;
use crate::training::metrics::TrainingMetrics;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Manifest file name inside a run directory.
pub const EXPERIMENT_MANIFEST: &str = "experiment.json";

/// Build `name[+backbone]_lr_<lr>_bs_<bs>_<DD_MM_YYYY_HH_MM>`.
pub fn generate_experiment_id(
    name_model: &str,
    backbone: Option<&str>,
    learning_rate: f64,
    batch_size: usize,
    started_at: DateTime<Local>,
) -> String {
    let name = match backbone {
        Some(b) if !b.is_empty() => format!("{name_model}+{b}"),
        _ => name_model.to_string(),
    };
    format!(
        "{name}_lr_{}_bs_{batch_size}_{}",
        format_float(learning_rate),
        started_at.format("%d_%m_%Y_%H_%M")
    )
}

/// Shortest round-trip rendering with a `.0` on integral values and
/// scientific notation (two-digit exponent) outside `[1e-4, 1e16)`.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let sci = format!("{x:e}");
        return match sci.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => sci,
        };
    }
    if x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

/// Training status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Pending,
    Running,
    Completed,
    EarlyStopped,
    Failed,
}

/// Hyperparameters recorded with a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub remainder: RemainderPolicy,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub reduce_lr_patience: usize,
    pub reduce_lr_factor: f64,
    pub early_stopping_patience: usize,
}

/// A training experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExperiment {
    pub id: String,
    pub name_model: String,
    pub backbone: Option<String>,
    pub hyperparams: Hyperparams,
    pub status: TrainingStatus,
    pub class_names: Vec<String>,
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    pub metrics: Option<TrainingMetrics>,
    pub checkpoint_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl TrainingExperiment {
    pub fn new(
        id: &str,
        name_model: &str,
        backbone: Option<&str>,
        hyperparams: Hyperparams,
        train_dir: &Path,
        val_dir: &Path,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name_model: name_model.to_string(),
            backbone: backbone.map(str::to_string),
            hyperparams,
            status: TrainingStatus::Pending,
            class_names: Vec::new(),
            train_dir: train_dir.to_path_buf(),
            val_dir: val_dir.to_path_buf(),
            metrics: None,
            checkpoint_path: None,
            model_path: None,
            created_at: now,
            updated_at: now,
            notes: None,
        }
    }

    pub fn set_status(&mut self, status: TrainingStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn load(path: &Path) -> Result<Option<Self>, MlError> {
        Ok(transferkit_core::load_json(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), MlError> {
        transferkit_core::atomic_write_json(path, self)?;
        Ok(())
    }
}
