//! Evaluation and prediction over one partition.

use crate::data::{LoadRequest, Partition, load_data, one_hot};
use crate::engine::ClassifierModel;
use crate::error::MlError;
use crate::eval::predictions::{PredictionTable, predictions_path};
use crate::eval::roc::{RocSummary, roc_path, roc_summary};
use crate::training::metrics::{ClassificationMetrics, MetricAccumulator};
use crate::zoo::BackboneKind;
use ndarray::{Axis, concatenate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where and how to evaluate.
#[derive(Debug, Clone)]
pub struct EvaluationTarget<'a> {
    pub backbone: Option<BackboneKind>,
    pub results_dir: &'a Path,
    pub experiment_id: &'a str,
    /// Also compute ROC curves and AUC.
    pub analyze: bool,
}

/// Outcome of [`evaluate_partition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionReport {
    pub partition: String,
    pub samples: usize,
    /// `None` when the partition's class names do not match the model's.
    pub metrics: Option<ClassificationMetrics>,
    pub predictions_path: PathBuf,
    pub roc_path: Option<PathBuf>,
}

/// Load `partition` in prediction mode, run inference, log performance and
/// write the prediction table (and ROC summary when requested).
pub fn evaluate_partition(
    model: &dyn ClassifierModel,
    partition: &Partition,
    target: &EvaluationTarget<'_>,
) -> Result<PartitionReport, MlError> {
    info!(partition = %partition.name, dir = %partition.dir.display(), "Evaluating");
    let request = LoadRequest::new(&partition.dir, 1)
        .with_class_dirs(partition.class_dirs.clone())
        .with_backbone(target.backbone)
        .for_prediction();
    let loaded = load_data(&request)?;
    let generator = &loaded.generator;

    let mut prob_parts = Vec::with_capacity(generator.batch_count());
    let mut positions = Vec::with_capacity(generator.num_samples());
    for step in 0..generator.batch_count() {
        let batch = generator.get_batch(step)?;
        prob_parts.push(model.predict_on_batch(batch.inputs.view())?);
        positions.extend(batch.positions);
    }
    let views: Vec<_> = prob_parts.iter().map(|p| p.view()).collect();
    let probs = concatenate(Axis(0), &views).map_err(|e| MlError::evaluation(e.to_string()))?;

    // Ground truth is only comparable if every data class is a model class.
    let model_classes = model.class_names();
    let label_map: Option<Vec<usize>> = loaded
        .class_names
        .names()
        .iter()
        .map(|name| model_classes.label_of(name))
        .collect();
    let truth: Option<Vec<usize>> = label_map.map(|map| {
        positions
            .iter()
            .map(|&pos| map[generator.labels()[pos]])
            .collect()
    });

    let mut metrics = match &truth {
        Some(labels) => {
            let mut acc = MetricAccumulator::new();
            acc.update(probs.view(), one_hot(labels, model.num_classes()).view());
            Some(acc.summary())
        }
        None => {
            warn!(
                partition = %partition.name,
                data_classes = ?loaded.class_names.names(),
                model_classes = ?model_classes.names(),
                "Class names differ from the model's, skipping performance metrics"
            );
            None
        }
    };

    let table = PredictionTable::from_probabilities(generator.samples(), &positions, &probs, model_classes)?;
    transferkit_core::ensure_dir(target.results_dir)?;
    let predictions_path = predictions_path(target.results_dir, &partition.name, target.experiment_id);
    table.write_csv(&predictions_path)?;
    info!(path = %predictions_path.display(), rows = table.len(), "Wrote predictions");

    let roc_path = match (&truth, target.analyze) {
        (Some(labels), true) => {
            let summary: RocSummary = roc_summary(&partition.name, target.experiment_id, &probs, labels, model_classes);
            if let Some(m) = metrics.as_mut() {
                m.auc_roc = summary.macro_auc;
            }
            let path = roc_path(target.results_dir, &partition.name, target.experiment_id);
            transferkit_core::atomic_write_json(&path, &summary)?;
            for curve in &summary.curves {
                info!(class = %curve.class_name, auc = ?curve.auc, "ROC");
            }
            Some(path)
        }
        (None, true) => {
            warn!(partition = %partition.name, "No comparable labels, skipping ROC analysis");
            None
        }
        _ => None,
    };

    if let Some(m) = &metrics {
        info!(
            partition = %partition.name,
            "Performance: loss {:.4}, accuracy {:.4}, precision {:.4}, recall {:.4}",
            m.loss,
            m.accuracy,
            m.precision,
            m.recall
        );
    }

    Ok(PartitionReport {
        partition: partition.name.clone(),
        samples: positions.len(),
        metrics,
        predictions_path,
        roc_path,
    })
}
