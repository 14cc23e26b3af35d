//! Application context: the one place that owns the queue, the registry and
//! the catalogs.
//!
//! Every `start_*` operation builds a job, registers its accumulator and
//! submits it, returning the job id to poll with [`AppContext::job_status`].

use crate::catalog::{DatasetCatalog, ModelCatalog};
use crate::collaborators::{Attack, Model, Perturbation};
use crate::config::NeuroshiftConfig;
use crate::data::{Dataset, Sample};
use crate::error::ContextError;
use crate::jobs::{AttackJob, InferenceJob, Job, JobKind, JobResult, PerturbationJob};
use crate::metrics::{MetricsAccumulator, MetricsRegistry};
use crate::queue::JobQueue;
use neuroshift_ids::JobId;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Where a submitted job stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Registered, no predictions yet
    Pending,
    Running { progress: f64 },
    Finished(JobResult),
}

impl JobStatus {
    fn of(accumulator: &MetricsAccumulator) -> Self {
        if let Some(result) = accumulator.result() {
            JobStatus::Finished(result)
        } else if accumulator.prediction_count() == 0 {
            JobStatus::Pending
        } else {
            JobStatus::Running {
                progress: accumulator.progress(),
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Finished(_))
    }
}

pub struct AppContext {
    config: NeuroshiftConfig,
    registry: Arc<MetricsRegistry>,
    queue: JobQueue,
    datasets: Mutex<DatasetCatalog>,
    models: Mutex<ModelCatalog>,
}

impl AppContext {
    /// Open the saved analytics and datasets, then start the workers.
    pub fn start(config: NeuroshiftConfig) -> Result<Self, ContextError> {
        config.validate()?;
        let registry = MetricsRegistry::open(
            config.paths.analytics.clone(),
            &config.analytics_file_fields(),
        )?;
        let datasets = DatasetCatalog::load(config.paths.datasets.clone())?;

        let queue = JobQueue::new();
        queue.start(config.workers)?;
        info!(
            "NeuroShift started: {} workers, analytics in {}",
            config.workers,
            config.paths.analytics.display()
        );

        Ok(Self {
            config,
            registry: Arc::new(registry),
            queue,
            datasets: Mutex::new(datasets),
            models: Mutex::new(ModelCatalog::new()),
        })
    }

    pub fn config(&self) -> &NeuroshiftConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn datasets(&self) -> MutexGuard<'_, DatasetCatalog> {
        self.datasets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn models(&self) -> MutexGuard<'_, ModelCatalog> {
        self.models.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, job: impl Into<JobKind>) -> JobId {
        let job = job.into();
        let id = job.id().clone();
        debug!("Submitting {} job {}", job.kind(), id);
        self.queue.submit(job);
        id
    }

    /// Evaluate `model` on `dataset`.
    pub fn start_inference(&self, model: Arc<dyn Model>, dataset: Arc<Dataset>) -> JobId {
        self.submit(InferenceJob::new(&self.registry, model, dataset, None))
    }

    /// Evaluate `model` on a dataset holding only `sample`.
    pub fn start_single_image_inference(
        &self,
        model: Arc<dyn Model>,
        sample: Sample,
    ) -> Result<JobId, ContextError> {
        let classes = sample.actual_class().map(str::to_string).into_iter().collect();
        let mut dataset = Dataset::new(sample.path(), sample.label(), "", classes, 1)?;
        dataset.add_sample(sample)?;
        Ok(self.start_inference(model, Arc::new(dataset)))
    }

    /// Evaluate `model` on `dataset` after perturbing the dataset.
    pub fn start_dataset_shift(
        &self,
        model: Arc<dyn Model>,
        dataset: Arc<Dataset>,
        perturbation: Arc<dyn Perturbation>,
    ) -> JobId {
        let shift = PerturbationJob::for_dataset(Arc::clone(&dataset), perturbation);
        self.submit(InferenceJob::new(&self.registry, model, dataset, Some(shift)))
    }

    /// Evaluate a perturbed copy of `model` on `dataset`.
    pub fn start_model_shift(
        &self,
        model: Arc<dyn Model>,
        dataset: Arc<Dataset>,
        perturbation: Arc<dyn Perturbation>,
    ) -> JobId {
        let shift = PerturbationJob::for_model(Arc::clone(&model), perturbation);
        self.submit(InferenceJob::new(&self.registry, model, dataset, Some(shift)))
    }

    /// Attack one sample; paced by `attack_delay_ms`.
    pub fn start_attack(
        &self,
        model: Arc<dyn Model>,
        sample: Arc<Sample>,
        attack: Arc<dyn Attack>,
    ) -> JobId {
        let pacing = self.config.attack_delay();
        self.submit(AttackJob::new(&self.registry, sample, model, attack, pacing))
    }

    /// `None` for ids the registry does not know.
    pub fn job_status(&self, id: &JobId) -> Option<JobStatus> {
        self.registry.get_by_id(id).map(|acc| JobStatus::of(&acc))
    }

    pub fn wait_until_idle(&self) {
        self.queue.wait_until_idle();
    }

    /// Stop the workers; queued jobs are discarded.
    pub fn shutdown(&self) {
        self.queue.stop();
        info!("NeuroShift stopped");
    }
}
