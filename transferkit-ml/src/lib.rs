//! # transferkit-ml
//!
//! Dataset loading and batch generation, the backbone/head model zoo, a
//! small training engine with callbacks and checkpoints, evaluation with
//! prediction tables and ROC analysis, and the experiment orchestrator
//! that ties them together.

// Foundation
pub mod config;
pub mod error;

// Data
pub mod data;

// Models
pub mod engine;
pub mod zoo;

// Training & evaluation
pub mod eval;
pub mod training;

// Orchestration
pub mod orchestrator;

// Re-exports
pub use config::MlConfig;
pub use error::MlError;
pub use orchestrator::{ExperimentStage, Orchestrator, RunMode, RunReport};
