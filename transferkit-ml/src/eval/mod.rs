//! Evaluation passes, prediction tables and ROC analysis.

pub mod evaluator;
pub mod predictions;
pub mod roc;

pub use evaluator::{EvaluationTarget, PartitionReport, evaluate_partition};
pub use predictions::{PREDICTED_COLUMN, PredictionRecord, PredictionTable, predictions_path};
pub use roc::{RocCurve, RocSummary, auc, roc_curve, roc_path, roc_summary};
