//! Fixed-epoch training loop.

use crate::data::BatchGenerator;
use crate::engine::ClassifierModel;
use crate::error::MlError;
use crate::training::callbacks::{CallbackAction, TrainingCallback};
use crate::training::metrics::{ClassificationMetrics, EpochLogs, MetricAccumulator, TrainingMetrics};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What [`TrainingRunner::fit`] reports back.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub metrics: TrainingMetrics,
    /// Set when a callback stopped training before the epoch budget ran out.
    pub stopped_early: bool,
}

/// Drives a model over a batch generator for a fixed number of epochs.
pub struct TrainingRunner {
    pub epochs: usize,
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl TrainingRunner {
    pub fn new(epochs: usize) -> Self {
        Self {
            epochs,
            callbacks: Vec::new(),
        }
    }

    pub fn with_callback(mut self, callback: impl TrainingCallback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn callback_names(&self) -> Vec<&'static str> {
        self.callbacks.iter().map(|c| c.name()).collect()
    }

    pub fn fit(
        &mut self,
        model: &mut dyn ClassifierModel,
        train: &mut BatchGenerator,
        mut val: Option<&mut BatchGenerator>,
    ) -> Result<TrainingOutcome, MlError> {
        let steps = train.batch_count();
        if steps == 0 {
            return Err(MlError::training(format!(
                "training data yields no batches ({} samples, batch size {})",
                train.num_samples(),
                train.batch_size()
            )));
        }
        if val.as_ref().is_some_and(|v| v.batch_count() == 0) {
            warn!("Validation data yields no full batch, training without validation");
            val = None;
        }

        for cb in &mut self.callbacks {
            cb.on_train_begin(&*model)?;
        }

        let started = Instant::now();
        let mut metrics = TrainingMetrics::default();
        let mut stopped_early = false;

        for epoch in 0..self.epochs {
            let lr = model.learning_rate();
            let mut acc = MetricAccumulator::new();
            for step in 0..steps {
                let batch = train.get_batch(step)?;
                let probs = model.train_on_batch(batch.inputs.view(), batch.targets.view())?;
                acc.update(probs.view(), batch.targets.view());
                debug!(epoch = epoch + 1, step = step + 1, steps, "Trained batch");
            }
            train.on_epoch_end();

            let val_metrics = match val.as_deref_mut() {
                Some(generator) => {
                    let m = evaluate(model, generator)?;
                    generator.on_epoch_end();
                    Some(m)
                }
                None => None,
            };

            let logs = EpochLogs {
                epoch,
                train: acc.summary(),
                val: val_metrics,
                lr,
            };
            log_epoch(&logs, self.epochs);

            let mut stop = false;
            for cb in &mut self.callbacks {
                if cb.on_epoch_end(&logs, &mut *model)? == CallbackAction::Stop {
                    stop = true;
                }
            }
            metrics.record_epoch(logs);
            if stop {
                stopped_early = epoch + 1 < self.epochs;
                break;
            }
        }

        for cb in &mut self.callbacks {
            cb.on_train_end(&mut *model)?;
        }

        metrics.total_training_time_secs = started.elapsed().as_secs_f64();
        info!(
            epochs = metrics.epochs_completed,
            secs = metrics.total_training_time_secs,
            metrics = ?metrics.metric_names(),
            "Total training time"
        );
        Ok(TrainingOutcome { metrics, stopped_early })
    }
}

/// Run inference over every batch and accumulate loss and metrics.
pub fn evaluate(model: &dyn ClassifierModel, generator: &BatchGenerator) -> Result<ClassificationMetrics, MlError> {
    let mut acc = MetricAccumulator::new();
    for step in 0..generator.batch_count() {
        let batch = generator.get_batch(step)?;
        let probs = model.predict_on_batch(batch.inputs.view())?;
        acc.update(probs.view(), batch.targets.view());
    }
    Ok(acc.summary())
}

fn log_epoch(logs: &EpochLogs, total: usize) {
    let t = &logs.train;
    match &logs.val {
        Some(v) => info!(
            "Epoch {}/{total} - loss: {:.4} - accuracy: {:.4} - precision: {:.4} - recall: {:.4} - val_loss: {:.4} - val_accuracy: {:.4} - val_precision: {:.4} - val_recall: {:.4} - lr: {}",
            logs.epoch + 1,
            t.loss,
            t.accuracy,
            t.precision,
            t.recall,
            v.loss,
            v.accuracy,
            v.precision,
            v.recall,
            logs.lr
        ),
        None => info!(
            "Epoch {}/{total} - loss: {:.4} - accuracy: {:.4} - precision: {:.4} - recall: {:.4} - lr: {}",
            logs.epoch + 1,
            t.loss,
            t.accuracy,
            t.precision,
            t.recall,
            logs.lr
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ClassIndex, GeneratorConfig, PixelTransform, RemainderPolicy, SampleId, SampleShape};
    use crate::engine::{ModelSpec, OptimizerKind, SequentialModel};
    use crate::training::callbacks::EarlyStoppingCallback;
    use crate::zoo::HeadKind;
    use std::path::Path;
    use tempfile::TempDir;

    const SHAPE: SampleShape = SampleShape::new(255, 255, 3);

    fn generator(dir: &Path, n: usize, batch_size: usize) -> BatchGenerator {
        let mut samples = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let label = i % 2;
            let path = dir.join(format!("s{i}.npy"));
            let value = label as f32;
            ndarray_npy::write_npy(&path, &ndarray::Array1::from_elem(SHAPE.len(), value)).unwrap();
            samples.push(SampleId::new(path).unwrap());
            labels.push(label);
        }
        BatchGenerator::new(
            samples,
            labels,
            GeneratorConfig {
                batch_size,
                shape: SHAPE,
                num_classes: 2,
                shuffle: true,
                remainder: RemainderPolicy::Drop,
                transform: PixelTransform::UnitScale,
                seed: Some(5),
            },
        )
        .unwrap()
    }

    fn model() -> SequentialModel {
        SequentialModel::assemble(
            ModelSpec {
                head: HeadKind::SimpleFc,
                backbone: None,
                class_names: ClassIndex::from_names(["zero", "one"]),
                optimizer: OptimizerKind::Adam,
                learning_rate: 0.05,
                experiment_id: "runner_test".into(),
            },
            Some(4),
        )
        .unwrap()
    }

    #[test]
    fn test_fit_runs_all_epochs() {
        let dir = TempDir::new().unwrap();
        let mut train = generator(dir.path(), 6, 2);
        let mut model = model();
        let mut runner = TrainingRunner::new(3);
        let outcome = runner.fit(&mut model, &mut train, None).unwrap();
        assert_eq!(outcome.metrics.epochs_completed, 3);
        assert!(!outcome.stopped_early);
        let history = &outcome.metrics.history;
        assert!(history[2].train.loss < history[0].train.loss);
    }

    #[test]
    fn test_early_stop_ends_loop() {
        let dir = TempDir::new().unwrap();
        let mut train = generator(dir.path(), 4, 2);
        let val_dir = TempDir::new().unwrap();
        let mut val = generator(val_dir.path(), 2, 2);
        let mut model = model();
        // patience 0 stops on the first epoch that fails to improve
        let mut runner = TrainingRunner::new(50).with_callback(EarlyStoppingCallback::new(0, 10.0));
        let outcome = runner.fit(&mut model, &mut train, Some(&mut val)).unwrap();
        assert_eq!(outcome.metrics.epochs_completed, 2);
        assert!(outcome.stopped_early);
        assert!(outcome.metrics.history[0].val.is_some());
    }

    #[test]
    fn test_no_batches_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut train = generator(dir.path(), 1, 2);
        let mut model = model();
        assert!(matches!(
            TrainingRunner::new(1).fit(&mut model, &mut train, None),
            Err(MlError::Training(_))
        ));
    }
}
