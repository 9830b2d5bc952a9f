//! Training callbacks: best-only checkpointing, LR reduction on plateau,
//! CSV history logging and early stopping.

use crate::engine::{ClassifierModel, ModelWeights};
use crate::error::MlError;
use crate::training::checkpoint::CheckpointManager;
use crate::training::metrics::EpochLogs;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Action a callback can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Hooks invoked by the training loop.
pub trait TrainingCallback: Send {
    fn name(&self) -> &'static str;

    fn on_train_begin(&mut self, _model: &dyn ClassifierModel) -> Result<(), MlError> {
        Ok(())
    }

    /// Called at the end of each epoch with the epoch's logs.
    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &mut dyn ClassifierModel) -> Result<CallbackAction, MlError>;

    fn on_train_end(&mut self, _model: &mut dyn ClassifierModel) -> Result<(), MlError> {
        Ok(())
    }
}

/// Tracks the best monitored value. Lower is better.
#[derive(Debug, Clone, Default)]
struct Plateau {
    min_delta: f64,
    best: Option<f64>,
    wait: usize,
}

impl Plateau {
    fn new(min_delta: f64) -> Self {
        Self {
            min_delta: min_delta.abs(),
            best: None,
            wait: 0,
        }
    }

    /// Record `value`; true if it improved on the best so far.
    fn observe(&mut self, value: f64) -> bool {
        match self.best {
            Some(best) if !(value < best - self.min_delta) => {
                self.wait += 1;
                false
            }
            _ => {
                self.best = Some(value);
                self.wait = 0;
                true
            }
        }
    }
}

/// Early stopping callback.
#[derive(Debug, Clone)]
pub struct EarlyStoppingCallback {
    pub patience: usize,
    pub restore_best_weights: bool,
    plateau: Plateau,
    best_weights: Option<ModelWeights>,
    stopped_epoch: Option<usize>,
}

impl EarlyStoppingCallback {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            restore_best_weights: true,
            plateau: Plateau::new(min_delta),
            best_weights: None,
            stopped_epoch: None,
        }
    }

    pub fn with_restore_best_weights(mut self, restore: bool) -> Self {
        self.restore_best_weights = restore;
        self
    }

    /// Zero-based epoch at which training was stopped, if it was.
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    fn check(&mut self, loss: f64) -> CallbackAction {
        if self.plateau.observe(loss) || self.plateau.wait < self.patience {
            CallbackAction::Continue
        } else {
            CallbackAction::Stop
        }
    }
}

impl TrainingCallback for EarlyStoppingCallback {
    fn name(&self) -> &'static str {
        "early_stopping"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &mut dyn ClassifierModel) -> Result<CallbackAction, MlError> {
        let before = self.plateau.best;
        let action = self.check(logs.monitored());
        if self.restore_best_weights && self.plateau.best != before {
            self.best_weights = Some(model.weights()?);
        }

        if action == CallbackAction::Stop {
            self.stopped_epoch = Some(logs.epoch);
            info!(epoch = logs.epoch + 1, patience = self.patience, "Early stopping");
            if let Some(weights) = self.best_weights.as_ref().filter(|_| self.restore_best_weights) {
                info!("Restoring model weights from the end of the best epoch");
                model.set_weights(weights)?;
            }
        }
        Ok(action)
    }
}

/// Multiplies the learning rate by `factor` after `patience` epochs without
/// improvement.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    pub patience: usize,
    pub factor: f64,
    pub min_lr: f64,
    plateau: Plateau,
}

impl ReduceLrOnPlateau {
    pub fn new(patience: usize, factor: f64) -> Self {
        Self {
            patience,
            factor,
            min_lr: 0.0,
            plateau: Plateau::new(1e-4),
        }
    }
}

impl TrainingCallback for ReduceLrOnPlateau {
    fn name(&self) -> &'static str {
        "reduce_lr_on_plateau"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &mut dyn ClassifierModel) -> Result<CallbackAction, MlError> {
        if !self.plateau.observe(logs.monitored()) && self.plateau.wait >= self.patience {
            let old_lr = model.learning_rate();
            if old_lr > self.min_lr {
                let new_lr = (old_lr * self.factor).max(self.min_lr);
                model.set_learning_rate(new_lr);
                info!(epoch = logs.epoch + 1, old_lr, new_lr, "Reducing learning rate");
            }
            self.plateau.wait = 0;
        }
        Ok(CallbackAction::Continue)
    }
}

/// Saves the model whenever the monitored value improves.
#[derive(Debug, Clone)]
pub struct ModelCheckpointCallback {
    path: PathBuf,
    experiment_id: String,
    manager: CheckpointManager,
    plateau: Plateau,
}

impl ModelCheckpointCallback {
    pub fn new(path: impl Into<PathBuf>, experiment_id: &str, manager: CheckpointManager) -> Self {
        Self {
            path: path.into(),
            experiment_id: experiment_id.to_string(),
            manager,
            plateau: Plateau::new(0.0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrainingCallback for ModelCheckpointCallback {
    fn name(&self) -> &'static str {
        "model_checkpoint"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &mut dyn ClassifierModel) -> Result<CallbackAction, MlError> {
        let value = logs.monitored();
        let previous = self.plateau.best;
        if self.plateau.observe(value) {
            model.save(&self.path)?;
            let monitor = if logs.val.is_some() { "val_loss" } else { "loss" };
            self.manager
                .record(&self.experiment_id, logs.epoch + 1, monitor, value, &self.path)?;
            match previous {
                Some(prev) => info!(
                    epoch = logs.epoch + 1,
                    "{monitor} improved from {prev:.5} to {value:.5}, saving model to {}",
                    self.path.display()
                ),
                None => info!(epoch = logs.epoch + 1, "Saving model to {}", self.path.display()),
            }
        }
        Ok(CallbackAction::Continue)
    }
}

/// Column order of the history file.
pub const HISTORY_COLUMNS: [&str; 10] = [
    "epoch",
    "loss",
    "accuracy",
    "precision",
    "recall",
    "val_loss",
    "val_accuracy",
    "val_precision",
    "val_recall",
    "lr",
];

/// Streams one row per epoch to a CSV file.
#[derive(Debug)]
pub struct CsvLoggerCallback {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

impl CsvLoggerCallback {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    fn writer(&mut self) -> Result<&mut csv::Writer<File>, MlError> {
        if self.writer.is_none() {
            let mut writer = csv::Writer::from_path(&self.path)?;
            writer.write_record(HISTORY_COLUMNS)?;
            self.writer = Some(writer);
        }
        self.writer
            .as_mut()
            .ok_or_else(|| MlError::training("history writer unavailable"))
    }
}

impl TrainingCallback for CsvLoggerCallback {
    fn name(&self) -> &'static str {
        "csv_logger"
    }

    fn on_train_begin(&mut self, _model: &dyn ClassifierModel) -> Result<(), MlError> {
        self.writer = None;
        self.writer().map(|_| ())
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, _model: &mut dyn ClassifierModel) -> Result<CallbackAction, MlError> {
        let val = |f: fn(&crate::training::metrics::ClassificationMetrics) -> f64| {
            logs.val.as_ref().map(|v| f(v).to_string()).unwrap_or_default()
        };
        let row = [
            logs.epoch.to_string(),
            logs.train.loss.to_string(),
            logs.train.accuracy.to_string(),
            logs.train.precision.to_string(),
            logs.train.recall.to_string(),
            val(|m| m.loss),
            val(|m| m.accuracy),
            val(|m| m.precision),
            val(|m| m.recall),
            logs.lr.to_string(),
        ];
        let writer = self.writer()?;
        writer.write_record(&row)?;
        writer.flush()?;
        Ok(CallbackAction::Continue)
    }

    fn on_train_end(&mut self, _model: &mut dyn ClassifierModel) -> Result<(), MlError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        } else {
            warn!(path = %self.path.display(), "History log was never opened");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ClassIndex, SampleShape};
    use crate::engine::NamedTensor;
    use crate::training::metrics::ClassificationMetrics;
    use ndarray::{Array2, ArrayView2, ArrayView4};
    use tempfile::TempDir;

    /// Records calls; its single weight is set by the test.
    struct StubModel {
        lr: f64,
        weight: f32,
        classes: ClassIndex,
        saves: usize,
    }

    impl StubModel {
        fn new() -> Self {
            Self {
                lr: 1e-3,
                weight: 0.0,
                classes: ClassIndex::from_names(["a", "b"]),
                saves: 0,
            }
        }
    }

    impl ClassifierModel for StubModel {
        fn num_classes(&self) -> usize {
            2
        }
        fn input_shape(&self) -> SampleShape {
            SampleShape::new(1, 1, 1)
        }
        fn class_names(&self) -> &ClassIndex {
            &self.classes
        }
        fn train_on_batch(&mut self, _: ArrayView4<'_, f32>, t: ArrayView2<'_, f32>) -> Result<Array2<f32>, MlError> {
            Ok(t.to_owned())
        }
        fn predict_on_batch(&self, i: ArrayView4<'_, f32>) -> Result<Array2<f32>, MlError> {
            Ok(Array2::zeros((i.shape()[0], 2)))
        }
        fn learning_rate(&self) -> f64 {
            self.lr
        }
        fn set_learning_rate(&mut self, lr: f64) {
            self.lr = lr;
        }
        fn weights(&self) -> Result<ModelWeights, MlError> {
            Ok(ModelWeights {
                tensors: vec![NamedTensor {
                    name: "w".into(),
                    shape: vec![1],
                    values: vec![self.weight],
                }],
            })
        }
        fn set_weights(&mut self, weights: &ModelWeights) -> Result<(), MlError> {
            self.weight = weights.tensors[0].values[0];
            Ok(())
        }
        fn save(&self, path: &Path) -> Result<(), MlError> {
            std::fs::write(path, format!("{}", self.weight))?;
            Ok(())
        }
        fn summary(&self) -> String {
            "stub".into()
        }
    }

    fn logs(epoch: usize, val_loss: f64) -> EpochLogs {
        EpochLogs {
            epoch,
            train: ClassificationMetrics {
                loss: 1.0,
                accuracy: 0.5,
                ..Default::default()
            },
            val: Some(ClassificationMetrics {
                loss: val_loss,
                ..Default::default()
            }),
            lr: 1e-3,
        }
    }

    #[test]
    fn test_early_stopping() {
        let mut cb = EarlyStoppingCallback::new(3, 0.01);
        assert_eq!(cb.check(0.5), CallbackAction::Continue); // first: sets best=0.5
        assert_eq!(cb.check(0.4), CallbackAction::Continue); // improves: best=0.4
        assert_eq!(cb.check(0.395), CallbackAction::Continue); // within min_delta: wait=1
        assert_eq!(cb.check(0.4), CallbackAction::Continue); // wait=2
        assert_eq!(cb.check(0.4), CallbackAction::Stop); // wait=3 >= patience
    }

    #[test]
    fn test_early_stopping_restores_best_weights() {
        let mut model = StubModel::new();
        let mut cb = EarlyStoppingCallback::new(2, 0.0);
        for (epoch, (weight, loss)) in [(1.0, 0.5), (2.0, 0.3), (3.0, 0.4), (4.0, 0.6)].into_iter().enumerate() {
            model.weight = weight;
            let action = cb.on_epoch_end(&logs(epoch, loss), &mut model).unwrap();
            assert_eq!(action == CallbackAction::Stop, epoch == 3);
        }
        assert_eq!(cb.stopped_epoch(), Some(3));
        assert_eq!(model.weight, 2.0);
    }

    #[test]
    fn test_reduce_lr_after_patience() {
        let mut model = StubModel::new();
        let mut cb = ReduceLrOnPlateau::new(2, 0.1);
        for (epoch, loss) in [0.5, 0.5, 0.5].into_iter().enumerate() {
            cb.on_epoch_end(&logs(epoch, loss), &mut model).unwrap();
        }
        assert!((model.lr - 1e-4).abs() < 1e-12);
        // counter restarts after a reduction
        cb.on_epoch_end(&logs(3, 0.5), &mut model).unwrap();
        assert!((model.lr - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn test_checkpoint_saves_only_improvements() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run_model.ckpt.json");
        let mut model = StubModel::new();
        let mut cb = ModelCheckpointCallback::new(&path, "run", CheckpointManager::new(dir.path(), 100));

        for (epoch, (weight, loss)) in [(1.0, 0.9), (2.0, 0.7), (3.0, 0.8)].into_iter().enumerate() {
            model.weight = weight;
            cb.on_epoch_end(&logs(epoch, loss), &mut model).unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2");
        let manifest = CheckpointManager::new(dir.path(), 100).list().unwrap();
        let epochs: Vec<_> = manifest.iter().map(|c| c.epoch).collect();
        assert_eq!(epochs, vec![1, 2]);
        assert_eq!(manifest[1].monitor, "val_loss");
    }

    #[test]
    fn test_csv_logger_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.csv");
        let mut model = StubModel::new();
        let mut cb = CsvLoggerCallback::new(&path);
        cb.on_train_begin(&model).unwrap();
        cb.on_epoch_end(&logs(0, 0.25), &mut model).unwrap();
        cb.on_epoch_end(&logs(1, 0.125), &mut model).unwrap();
        cb.on_train_end(&mut model).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], HISTORY_COLUMNS.join(","));
        assert_eq!(lines[1], "0,1,0.5,0,0,0.25,0,0,0,0.001");
        assert_eq!(lines.len(), 3);
    }
}
