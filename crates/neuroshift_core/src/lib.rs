//! NeuroShift core: robustness-evaluation jobs, a worker pool that runs them,
//! and the metrics they accumulate.
//!
//! # Flow
//!
//! ```text
//! AppContext::start_inference ─► InferenceJob::new ─► MetricsRegistry::add
//!            │                                               ▲
//!            ▼                                               │ poll by JobId
//!       JobQueue::submit ─► worker ─► Job::execute ─► MetricsAccumulator
//! ```
//!
//! Models, perturbations and attacks are external collaborators behind the
//! traits in [`collaborators`].

pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod queue;

pub use catalog::{DatasetCatalog, ModelCatalog};
pub use collaborators::{Attack, Model, Perturbation};
pub use config::{NeuroshiftConfig, DEFAULT_CONFIG_FILE};
pub use context::{AppContext, JobStatus};
pub use data::{Batch, Dataset, Prediction, Sample, Target, Tensor};
pub use error::{
    AccumulatorError, CatalogError, CollaboratorError, ConfigError, ContextError, DataError, JobError,
    QueueError,
};
pub use jobs::{AttackJob, InferenceJob, Job, JobKind, JobResult, PerturbationJob, PerturbationSubject};
pub use metrics::{CompositeKey, ConfusionCounts, MetricsAccumulator, MetricsRegistry};
pub use neuroshift_ids::JobId;
pub use queue::{JobQueue, QueueStats, QueueStatsSnapshot};
