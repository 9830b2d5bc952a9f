//! One-vs-rest ROC curves and AUC.

use crate::data::ClassIndex;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// ROC curve of one class against the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub class_name: String,
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Score threshold for each point; the first point uses `+inf`, stored as `null`.
    pub thresholds: Vec<Option<f64>>,
    /// `None` when the partition has no positives or no negatives for this class.
    pub auc: Option<f64>,
}

/// Curves for every class of one evaluated partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocSummary {
    pub partition: String,
    pub experiment_id: String,
    pub curves: Vec<RocCurve>,
    /// Mean AUC over the classes that have one.
    pub macro_auc: Option<f64>,
}

/// Build the curve for binary `labels` ranked by `scores`.
pub fn roc_curve(scores: &[f32], labels: &[bool]) -> (Vec<f64>, Vec<f64>, Vec<Option<f64>>) {
    let mut order: Vec<usize> = (0..scores.len().min(labels.len())).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let positives = order.iter().filter(|&&i| labels[i]).count() as f64;
    let negatives = order.len() as f64 - positives;

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let mut thresholds = vec![None];
    let (mut tp, mut fp) = (0.0, 0.0);
    for (k, &i) in order.iter().enumerate() {
        if labels[i] {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        // Emit a point only after the last sample sharing this score.
        let last_of_score = order.get(k + 1).is_none_or(|&next| scores[next] != scores[i]);
        if last_of_score {
            fpr.push(if negatives > 0.0 { fp / negatives } else { 0.0 });
            tpr.push(if positives > 0.0 { tp / positives } else { 0.0 });
            thresholds.push(Some(f64::from(scores[i])));
        }
    }
    (fpr, tpr, thresholds)
}

/// Trapezoidal area under the curve.
pub fn auc(fpr: &[f64], tpr: &[f64]) -> f64 {
    fpr.windows(2)
        .zip(tpr.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
        .sum()
}

/// One-vs-rest curves for every class column of `probs`.
pub fn roc_summary(
    partition: &str,
    experiment_id: &str,
    probs: &Array2<f32>,
    labels: &[usize],
    classes: &ClassIndex,
) -> RocSummary {
    let mut curves = Vec::with_capacity(probs.ncols());
    for (class, column) in probs.columns().into_iter().enumerate() {
        let scores: Vec<f32> = column.to_vec();
        let truth: Vec<bool> = labels.iter().map(|&l| l == class).collect();
        let has_both = truth.iter().any(|&t| t) && truth.iter().any(|&t| !t);
        let (fpr, tpr, thresholds) = roc_curve(&scores, &truth);
        let area = has_both.then(|| auc(&fpr, &tpr));
        curves.push(RocCurve {
            class_name: classes.name_of(class).unwrap_or_default().to_string(),
            fpr,
            tpr,
            thresholds,
            auc: area,
        });
    }

    let aucs: Vec<f64> = curves.iter().filter_map(|c| c.auc).collect();
    let macro_auc = (!aucs.is_empty()).then(|| aucs.iter().sum::<f64>() / aucs.len() as f64);
    RocSummary {
        partition: partition.to_string(),
        experiment_id: experiment_id.to_string(),
        curves,
        macro_auc,
    }
}

/// `<results>/roc_<partition>_<experiment_id>_.json`
pub fn roc_path(results_dir: &Path, partition: &str, experiment_id: &str) -> PathBuf {
    results_dir.join(format!("roc_{partition}_{experiment_id}_.json"))
}
