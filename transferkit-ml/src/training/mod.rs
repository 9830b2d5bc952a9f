//! Training infrastructure: experiments, the fit loop, metrics, callbacks and checkpoints.

pub mod callbacks;
pub mod checkpoint;
pub mod experiment;
pub mod metrics;
pub mod runner;

pub use callbacks::{
    CallbackAction, CsvLoggerCallback, EarlyStoppingCallback, ModelCheckpointCallback, ReduceLrOnPlateau,
    TrainingCallback,
};
pub use checkpoint::{Checkpoint, CheckpointManager};
pub use experiment::{Hyperparams, TrainingExperiment, TrainingStatus, format_float, generate_experiment_id};
pub use metrics::{ClassificationMetrics, EpochLogs, MetricAccumulator, TrainingMetrics, categorical_crossentropy};
pub use runner::{TrainingOutcome, TrainingRunner, evaluate};
