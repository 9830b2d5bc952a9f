//! Error types for the transferkit-ml crate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for data loading, training and evaluation.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("No class sub-directories or annotation file found in {}", .0.display())]
    UnresolvedDirectoryStructure(PathBuf),

    #[error("No CSV annotation file found in {}", .0.display())]
    NoAnnotationFound(PathBuf),

    #[error("Failed to decode image {}: {reason}", .path.display())]
    DecodeError { path: PathBuf, reason: String },

    #[error("Shape mismatch for {}: expected {expected:?}, found {found:?}", .path.display())]
    ShapeMismatch {
        path: PathBuf,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Unrecognized dataset layout in {}: missing {missing}; pass the validation dataset explicitly", .dir.display())]
    AmbiguousDatasetLayout { dir: PathBuf, missing: String },

    #[error("Unsupported sample file (expected .csv, .npy, .png, .jpg or .jpeg): {}", .0.display())]
    UnsupportedSample(PathBuf),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("NPY read error: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DecodeError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
