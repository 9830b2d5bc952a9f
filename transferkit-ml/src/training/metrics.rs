//! Loss and classification metrics, per batch and per epoch.

use crate::engine::InferenceBackend;
use crate::engine::network::{label_tensor, matrix_tensor};
use burn::nn::loss::CrossEntropyLossConfig;
use ndarray::{ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` before taking logs.
pub const EPSILON: f32 = 1e-7;

/// Threshold applied element-wise for precision and recall.
pub const THRESHOLD: f32 = 0.5;

/// Mean categorical cross-entropy of probabilities against one-hot targets.
///
/// The clipped log-probabilities are fed to burn's loss as logits; their
/// log-softmax is the same log-probability.
pub fn categorical_crossentropy(probs: ArrayView2<'_, f32>, targets: ArrayView2<'_, f32>) -> f64 {
    if probs.nrows() == 0 {
        return 0.0;
    }
    let device = Default::default();
    let logits = matrix_tensor::<InferenceBackend>(probs, &device)
        .clamp(EPSILON, 1.0 - EPSILON)
        .log();
    let labels = label_tensor::<InferenceBackend>(targets, &device);
    let loss = CrossEntropyLossConfig::new().init(&device).forward(logits, labels);
    f64::from(loss.into_scalar())
}

/// Running sums for loss, accuracy, precision and recall over many batches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricAccumulator {
    loss_sum: f64,
    samples: usize,
    correct: usize,
    true_positives: usize,
    predicted_positives: usize,
    actual_positives: usize,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, probs: ArrayView2<'_, f32>, targets: ArrayView2<'_, f32>) {
        let rows = probs.nrows();
        self.loss_sum += categorical_crossentropy(probs, targets) * rows as f64;
        self.samples += rows;

        for (p_row, t_row) in probs.rows().into_iter().zip(targets.rows()) {
            if argmax(p_row.iter().copied()) == argmax(t_row.iter().copied()) {
                self.correct += 1;
            }
        }

        Zip::from(&probs).and(&targets).for_each(|&p, &t| {
            let predicted = p > THRESHOLD;
            let actual = t > THRESHOLD;
            self.predicted_positives += usize::from(predicted);
            self.actual_positives += usize::from(actual);
            self.true_positives += usize::from(predicted && actual);
        });
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn summary(&self) -> ClassificationMetrics {
        ClassificationMetrics {
            loss: ratio_f(self.loss_sum, self.samples),
            accuracy: ratio(self.correct, self.samples),
            precision: ratio(self.true_positives, self.predicted_positives),
            recall: ratio(self.true_positives, self.actual_positives),
            auc_roc: None,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn ratio_f(num: f64, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num / den as f64 }
}

fn argmax(values: impl Iterator<Item = f32>) -> usize {
    values
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
        .0
}

/// Classification metrics for one pass over a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    /// Macro-averaged one-vs-rest AUC, when computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auc_roc: Option<f64>,
}

/// Everything logged at the end of one epoch. `epoch` is zero-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    pub epoch: usize,
    pub train: ClassificationMetrics,
    pub val: Option<ClassificationMetrics>,
    /// Learning rate in effect during the epoch.
    pub lr: f64,
}

impl EpochLogs {
    /// Value tracked by checkpointing, LR reduction and early stopping:
    /// `val_loss`, or `loss` when there is no validation data.
    pub fn monitored(&self) -> f64 {
        self.val.map_or(self.train.loss, |v| v.loss)
    }
}

/// Training metrics for an experiment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub history: Vec<EpochLogs>,
    /// One-based epoch with the best monitored value.
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    pub total_training_time_secs: f64,
}

impl TrainingMetrics {
    pub fn record_epoch(&mut self, logs: EpochLogs) {
        let check_loss = logs.monitored();
        self.history.push(logs);
        self.epochs_completed += 1;

        if self.best_loss.is_none_or(|best| check_loss < best) {
            self.best_loss = Some(check_loss);
            self.best_epoch = Some(self.epochs_completed);
        }
    }

    pub fn last(&self) -> Option<&EpochLogs> {
        self.history.last()
    }

    /// Names of the tracked metrics, in log order.
    pub fn metric_names(&self) -> Vec<&'static str> {
        let mut names = vec!["loss", "accuracy", "precision", "recall"];
        if self.history.iter().any(|e| e.val.is_some()) {
            names.extend(["val_loss", "val_accuracy", "val_precision", "val_recall"]);
        }
        names.push("lr");
        names
    }
}
