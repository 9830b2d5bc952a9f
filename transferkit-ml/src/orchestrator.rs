//! Experiment orchestration: layout resolution, data loading, model assembly,
//! training with callbacks, and evaluation passes.

use crate::config::MlConfig;
use crate::data::{DatasetLayout, LoadRequest, LoadedData, Partition, load_data, resolve_layout, test_partitions};
use crate::engine::{ClassifierModel, ModelSpec, SequentialModel};
use crate::error::MlError;
use crate::eval::{EvaluationTarget, PartitionReport, evaluate_partition};
use crate::training::experiment::EXPERIMENT_MANIFEST;
use crate::training::{
    CheckpointManager, CsvLoggerCallback, EarlyStoppingCallback, Hyperparams, ModelCheckpointCallback,
    ReduceLrOnPlateau, TrainingExperiment, TrainingMetrics, TrainingRunner, TrainingStatus, generate_experiment_id,
};
use crate::zoo::{BackboneKind, HeadKind};
use chrono::Local;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Checkpoint manifest entries kept per run.
const MAX_CHECKPOINTS: usize = 100;

/// What the orchestrator was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Predict,
    /// Anything else. Logged and ignored.
    Unrecognized(String),
}

impl From<&str> for RunMode {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Self::Train,
            "predict" => Self::Predict,
            _ => Self::Unrecognized(s.to_string()),
        }
    }
}

/// Experiment lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentStage {
    Configuring,
    DataLoading,
    ModelAssembly,
    Training,
    Evaluating,
    Done,
}

impl fmt::Display for ExperimentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentStage::Configuring => write!(f, "configuring"),
            ExperimentStage::DataLoading => write!(f, "data_loading"),
            ExperimentStage::ModelAssembly => write!(f, "model_assembly"),
            ExperimentStage::Training => write!(f, "training"),
            ExperimentStage::Evaluating => write!(f, "evaluating"),
            ExperimentStage::Done => write!(f, "done"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub experiment_id: String,
    pub run_dir: PathBuf,
    /// Set for training runs.
    pub status: Option<TrainingStatus>,
    pub metrics: Option<TrainingMetrics>,
    pub model_path: Option<PathBuf>,
    pub partitions: Vec<PartitionReport>,
}

/// Drives one invocation from configuration to written artifacts.
#[derive(Debug)]
pub struct Orchestrator {
    config: MlConfig,
    stage: ExperimentStage,
    history: Vec<ExperimentStage>,
}

impl Orchestrator {
    pub fn new(config: MlConfig) -> Self {
        Self {
            config,
            stage: ExperimentStage::Configuring,
            history: vec![ExperimentStage::Configuring],
        }
    }

    pub fn config(&self) -> &MlConfig {
        &self.config
    }

    pub fn stage(&self) -> ExperimentStage {
        self.stage
    }

    /// Every stage entered so far, in order.
    pub fn stage_history(&self) -> &[ExperimentStage] {
        &self.history
    }

    fn enter(&mut self, stage: ExperimentStage) {
        info!(from = %self.stage, to = %stage, "Experiment stage");
        self.stage = stage;
        self.history.push(stage);
    }

    /// Dispatch on `mode`. Unrecognized modes do nothing and return `None`.
    pub fn run(&mut self, mode: &RunMode) -> Result<Option<RunReport>, MlError> {
        match mode {
            RunMode::Train => self.train().map(Some),
            RunMode::Predict => self.predict().map(Some),
            RunMode::Unrecognized(other) => {
                warn!(mode = %other, "Unrecognized mode, expected 'train' or 'predict'");
                Ok(None)
            }
        }
    }

    fn backbone(&self) -> Result<Option<BackboneKind>, MlError> {
        match self.config.model.backbone.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(name) => name.parse().map(Some),
        }
    }

    fn load_request(&self, dir: &Path, backbone: Option<BackboneKind>, seed: Option<u64>) -> LoadRequest {
        let training = &self.config.training;
        LoadRequest::new(dir, training.batch_size)
            .with_backbone(backbone)
            .with_remainder(training.remainder)
            .with_shuffle(training.shuffle)
            .with_seed(seed)
    }

    /// Train a new model and evaluate the requested partitions.
    pub fn train(&mut self) -> Result<RunReport, MlError> {
        // Configuring
        let head: HeadKind = self.config.model.name_model.parse()?;
        let backbone = self.backbone()?;
        let paths = self.config.paths.clone();
        let layout = resolve_layout(&paths.dataset_dir, paths.val_dataset.as_deref())?;
        let training = self.config.training.clone();

        let experiment_id = generate_experiment_id(
            head.name(),
            backbone.map(BackboneKind::name),
            training.learning_rate,
            training.batch_size,
            Local::now(),
        );
        let run_dir = paths.results_dir.join(&experiment_id);
        transferkit_core::ensure_dir(&run_dir)?;
        info!(id = %experiment_id, dir = %run_dir.display(), "New experiment");

        let mut experiment = TrainingExperiment::new(
            &experiment_id,
            head.name(),
            backbone.map(BackboneKind::name),
            Hyperparams {
                epochs: training.epochs,
                batch_size: training.batch_size,
                learning_rate: training.learning_rate,
                optimizer: training.optimizer,
                remainder: training.remainder,
                shuffle: training.shuffle,
                seed: training.seed,
                reduce_lr_patience: training.reduce_lr_patience,
                reduce_lr_factor: training.reduce_lr_factor,
                early_stopping_patience: training.early_stopping_patience,
            },
            &layout.train_dir,
            &layout.val_dir,
        );
        let manifest = run_dir.join(EXPERIMENT_MANIFEST);
        experiment.save(&manifest)?;

        // DataLoading
        self.enter(ExperimentStage::DataLoading);
        let (mut train_data, mut val_data) = match self.load_splits(&layout, backbone) {
            Ok(data) => data,
            Err(e) => return Err(fail(&mut experiment, &manifest, e)),
        };
        experiment.class_names = train_data.class_names.names().to_vec();

        // ModelAssembly
        self.enter(ExperimentStage::ModelAssembly);
        let spec = ModelSpec {
            head,
            backbone,
            class_names: train_data.class_names.clone(),
            optimizer: training.optimizer,
            learning_rate: training.learning_rate,
            experiment_id: experiment_id.clone(),
        };
        let mut model = match SequentialModel::assemble(spec, training.seed) {
            Ok(model) => model,
            Err(e) => return Err(fail(&mut experiment, &manifest, e)),
        };
        info!("\n{}", model.summary());

        // Training
        self.enter(ExperimentStage::Training);
        experiment.set_status(TrainingStatus::Running);
        experiment.save(&manifest)?;

        let checkpoint_path = run_dir.join(format!("{experiment_id}_model.ckpt.json"));
        let history_path = run_dir.join(format!("train_history_{experiment_id}_.csv"));
        let mut runner = TrainingRunner::new(training.epochs)
            .with_callback(ModelCheckpointCallback::new(
                &checkpoint_path,
                &experiment_id,
                CheckpointManager::new(&run_dir, MAX_CHECKPOINTS),
            ))
            .with_callback(ReduceLrOnPlateau::new(training.reduce_lr_patience, training.reduce_lr_factor))
            .with_callback(CsvLoggerCallback::new(&history_path))
            .with_callback(EarlyStoppingCallback::new(
                training.early_stopping_patience,
                training.min_delta,
            ));

        let outcome = match runner.fit(&mut model, &mut train_data.generator, Some(&mut val_data.generator)) {
            Ok(outcome) => outcome,
            Err(e) => return Err(fail(&mut experiment, &manifest, e)),
        };

        let model_path = run_dir.join(format!("{experiment_id}_model.json"));
        model.save(&model_path)?;
        let status = if outcome.stopped_early {
            TrainingStatus::EarlyStopped
        } else {
            TrainingStatus::Completed
        };
        experiment.metrics = Some(outcome.metrics.clone());
        experiment.checkpoint_path = checkpoint_path.is_file().then_some(checkpoint_path);
        experiment.model_path = Some(model_path.clone());
        experiment.set_status(status);
        experiment.save(&manifest)?;
        info!(status = ?status, model = %model_path.display(), "Training finished");

        // Evaluating
        let mut partitions = Vec::new();
        if self.config.evaluation.eval_val_set {
            partitions.push(Partition::new("val", layout.val_dir.clone()));
        }
        if self.config.evaluation.eval_train_set {
            partitions.push(Partition::new("train", layout.train_dir.clone()));
        }
        if let Some(test_dir) = &paths.test_dataset {
            partitions.extend(test_partitions(test_dir)?);
        }
        let reports = self.evaluate_all(&model, &partitions, &run_dir, &experiment_id)?;

        self.enter(ExperimentStage::Done);
        Ok(RunReport {
            experiment_id,
            run_dir,
            status: Some(status),
            metrics: Some(outcome.metrics),
            model_path: Some(model_path),
            partitions: reports,
        })
    }

    fn load_splits(
        &self,
        layout: &DatasetLayout,
        backbone: Option<BackboneKind>,
    ) -> Result<(LoadedData, LoadedData), MlError> {
        let seed = self.config.training.seed;
        let train = load_data(&self.load_request(&layout.train_dir, backbone, seed))?;
        let val = load_data(&self.load_request(&layout.val_dir, backbone, seed.map(|s| s.wrapping_add(1))))?;
        let val = val.align_to(&train.class_names)?;
        info!(
            classes = ?train.class_names.names(),
            train = train.generator.num_samples(),
            val = val.generator.num_samples(),
            "Loaded training and validation data"
        );
        Ok((train, val))
    }

    /// Reload a saved model and evaluate the test data (plus the validation
    /// and training data when asked).
    pub fn predict(&mut self) -> Result<RunReport, MlError> {
        let weights = self
            .config
            .model
            .weights
            .clone()
            .ok_or_else(|| MlError::Config("predict mode needs a saved model (--weights)".to_string()))?;
        let paths = self.config.paths.clone();
        let eval = self.config.evaluation.clone();
        if paths.test_dataset.is_none() && !eval.eval_val_set && !eval.eval_train_set {
            return Err(MlError::Config(
                "predict mode needs a test dataset (--test-dataset) or --eval-val/--eval-train".to_string(),
            ));
        }

        self.enter(ExperimentStage::ModelAssembly);
        let model = SequentialModel::load(&weights)?;
        let experiment_id = model.spec().experiment_id.clone();
        let run_dir = paths.results_dir.join(&experiment_id);
        info!(id = %experiment_id, weights = %weights.display(), "Loaded model");
        info!("\n{}", model.summary());

        let mut partitions = Vec::new();
        if eval.eval_val_set || eval.eval_train_set {
            let layout = resolve_layout(&paths.dataset_dir, paths.val_dataset.as_deref())?;
            if eval.eval_val_set {
                partitions.push(Partition::new("val", layout.val_dir));
            }
            if eval.eval_train_set {
                partitions.push(Partition::new("train", layout.train_dir));
            }
        }
        if let Some(test_dir) = &paths.test_dataset {
            partitions.extend(test_partitions(test_dir)?);
        }
        let reports = self.evaluate_all(&model, &partitions, &run_dir, &experiment_id)?;

        self.enter(ExperimentStage::Done);
        Ok(RunReport {
            experiment_id,
            run_dir,
            status: None,
            metrics: None,
            model_path: Some(weights),
            partitions: reports,
        })
    }

    fn evaluate_all(
        &mut self,
        model: &SequentialModel,
        partitions: &[Partition],
        run_dir: &Path,
        experiment_id: &str,
    ) -> Result<Vec<PartitionReport>, MlError> {
        let target = EvaluationTarget {
            backbone: model.spec().backbone,
            results_dir: run_dir,
            experiment_id,
            analyze: self.config.evaluation.analyze_data,
        };
        let mut reports = Vec::with_capacity(partitions.len());
        for partition in partitions {
            self.enter(ExperimentStage::Evaluating);
            reports.push(evaluate_partition(model, partition, &target)?);
        }
        Ok(reports)
    }
}

/// Mark the experiment failed, persist it, and hand the error back.
fn fail(experiment: &mut TrainingExperiment, manifest: &Path, error: MlError) -> MlError {
    experiment.notes = Some(error.to_string());
    experiment.set_status(TrainingStatus::Failed);
    if let Err(save_err) = experiment.save(manifest) {
        warn!(error = %save_err, "Could not record the failure in the experiment manifest");
    }
    error
}
