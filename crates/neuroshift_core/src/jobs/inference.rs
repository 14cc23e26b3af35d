//! Evaluate a model on a dataset, optionally under a perturbation.

use super::{Job, JobCore, JobResult, PerturbationJob, PerturbationSubject};
use crate::collaborators::Model;
use crate::data::{Dataset, Prediction, Target};
use crate::error::JobError;
use crate::metrics::{MetricsAccumulator, MetricsRegistry};
use neuroshift_ids::JobId;
use std::sync::Arc;
use tracing::{debug, info};

pub struct InferenceJob {
    core: JobCore,
    model: Arc<dyn Model>,
    dataset: Arc<Dataset>,
    perturbation: Option<PerturbationJob>,
}

impl InferenceJob {
    /// Create the job and register its accumulator in `registry`, so the job
    /// is visible as pending before any worker picks it up.
    pub fn new(
        registry: &MetricsRegistry,
        model: Arc<dyn Model>,
        dataset: Arc<Dataset>,
        perturbation: Option<PerturbationJob>,
    ) -> Self {
        let id = JobId::new();
        let perturbation_name = perturbation.as_ref().map(PerturbationJob::name);
        let accumulator = Arc::new(MetricsAccumulator::new(
            id.clone(),
            dataset.len(),
            Some(model.file_name()),
            Some(dataset.as_ref()),
            perturbation_name.as_deref(),
        ));
        registry.add(Arc::clone(&accumulator));

        Self {
            core: JobCore::new(id, accumulator),
            model,
            dataset,
            perturbation,
        }
    }

    pub fn accumulator(&self) -> &Arc<MetricsAccumulator> {
        self.core.accumulator()
    }

    /// A dataset perturbation must wrap the dataset this job evaluates, or
    /// originals and perturbed samples would be paired up wrongly.
    fn check_subject(&self, perturbation: &PerturbationJob) -> Result<(), JobError> {
        if let PerturbationSubject::Dataset(subject) = perturbation.subject() {
            if subject.file_name() != self.dataset.file_name() || subject.len() != self.dataset.len() {
                return Err(JobError::DatasetMismatch {
                    expected: self.dataset.file_name().to_string(),
                    expected_len: self.dataset.len(),
                    actual: subject.file_name().to_string(),
                    actual_len: subject.len(),
                });
            }
        }
        Ok(())
    }

    /// The dataset and model actually evaluated.
    fn perturbed_inputs(&self) -> Result<(Arc<Dataset>, Arc<dyn Model>), JobError> {
        let Some(perturbation) = &self.perturbation else {
            return Ok((Arc::clone(&self.dataset), Arc::clone(&self.model)));
        };
        match perturbation.target() {
            Target::Dataset => {
                self.check_subject(perturbation)?;
                Ok((
                    Arc::new(perturbation.apply_to_dataset()?),
                    Arc::clone(&self.model),
                ))
            }
            Target::ModelParameter | Target::ModelActivation => {
                Ok((Arc::clone(&self.dataset), perturbation.apply_to_model()?))
            }
        }
    }

    fn run(&self) -> Result<(), JobError> {
        let (perturbed_dataset, perturbed_model) = self.perturbed_inputs()?;
        let accumulator = self.core.accumulator();

        for (original, perturbed) in self.dataset.batches().zip(perturbed_dataset.batches()) {
            let results = perturbed_model.infer(&perturbed.tensor)?;
            if results.len() != perturbed.samples.len() {
                return Err(JobError::ResultCount {
                    expected: perturbed.samples.len(),
                    actual: results.len(),
                });
            }

            let predictions = original
                .samples
                .into_iter()
                .zip(perturbed.samples)
                .zip(results)
                .map(|((input, perturbed_input), (class, confidence))| {
                    Prediction::new(input, perturbed_input, class, confidence)
                });
            accumulator.add_predictions(predictions)?;
            debug!(
                "Job {} progress {:.0}%",
                self.core.id(),
                accumulator.progress() * 100.0
            );
        }
        Ok(())
    }
}

impl Job for InferenceJob {
    fn id(&self) -> &JobId {
        self.core.id()
    }

    fn execute(&mut self) -> JobResult {
        info!(
            "Inference job {} on {} ({} samples)",
            self.core.id(),
            self.dataset.file_name(),
            self.dataset.len()
        );
        self.core.run(|| self.run())
    }
}
