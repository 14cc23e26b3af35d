//! Error types for the NeuroShift core.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid tensor or dataset construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Shape does not describe the number of elements supplied
    #[error("Shape {shape:?} holds {expected} elements, got {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    /// A sample whose shape differs from the rest of its dataset
    #[error("Sample '{label}' has shape {found:?}, dataset uses {expected:?}")]
    IncompatibleSample {
        label: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Batch size must be at least 1")]
    ZeroBatchSize,
}

/// Failure reported by a model, perturbation or attack.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Perturbation failed: {0}")]
    Perturbation(String),

    #[error("Attack failed: {0}")]
    Attack(String),

    /// The model cannot produce an independent copy of itself
    #[error("Model cannot be cloned: {0}")]
    Clone(String),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Rejected accumulator update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorError {
    /// The accumulator is done; `dropped` predictions were not recorded
    #[error("Accumulator is complete, {dropped} prediction(s) dropped")]
    Completed { dropped: usize },

    #[error("CSV export failed: {0}")]
    Export(String),
}

impl From<csv::Error> for AccumulatorError {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

/// Anything that can go wrong inside `Job::execute`.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    /// The model returned a different number of results than inputs
    #[error("Model returned {actual} result(s) for a batch of {expected}")]
    ResultCount { expected: usize, actual: usize },

    /// A perturbation was asked to act on a subject it does not target
    #[error("Perturbation '{name}' targets {target} and cannot be applied to a {subject}")]
    TargetMismatch {
        name: String,
        target: String,
        subject: &'static str,
    },

    /// A dataset perturbation wraps a different dataset than the job evaluates
    #[error("Perturbation wraps {actual} ({actual_len} samples) but the job evaluates {expected} ({expected_len} samples)")]
    DatasetMismatch {
        expected: String,
        expected_len: usize,
        actual: String,
        actual_len: usize,
    },

    /// A collaborator panicked
    #[error("Job panicked: {0}")]
    Panicked(String),
}

/// Worker pool failures.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Job queue is already running with {0} worker(s)")]
    AlreadyRunning(usize),
}

/// Configuration file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write config {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Dataset or model catalog misuse.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("An entry named '{0}' already exists")]
    Duplicate(String),

    #[error("No entry named '{0}'")]
    NotFound(String),

    /// The model catalog must keep at least one model
    #[error("Cannot delete the last model")]
    LastModel,

    #[error(transparent)]
    Store(#[from] neuroshift_store::StoreError),
}

/// Failure to bring up or drive an [`AppContext`](crate::AppContext).
#[derive(Error, Debug)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] neuroshift_store::StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Data(#[from] DataError),
}
