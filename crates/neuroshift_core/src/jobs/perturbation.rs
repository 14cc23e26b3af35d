//! Perturbation of a dataset or a model.
//!
//! Produces no predictions. An [`InferenceJob`](super::InferenceJob) calls
//! [`PerturbationJob::apply_to_dataset`] or [`PerturbationJob::apply_to_model`]
//! synchronously before evaluating.

use super::{guarded, Job, JobResult};
use crate::collaborators::{Model, Perturbation};
use crate::data::{Dataset, Target, Tensor};
use crate::error::{DataError, JobError};
use neuroshift_ids::JobId;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a [`PerturbationJob`] perturbs.
#[derive(Clone)]
pub enum PerturbationSubject {
    Dataset(Arc<Dataset>),
    Model(Arc<dyn Model>),
}

impl PerturbationSubject {
    fn kind(&self) -> &'static str {
        match self {
            PerturbationSubject::Dataset(_) => "dataset",
            PerturbationSubject::Model(_) => "model",
        }
    }
}

pub struct PerturbationJob {
    id: JobId,
    subject: PerturbationSubject,
    perturbation: Arc<dyn Perturbation>,
}

impl PerturbationJob {
    pub fn new(subject: PerturbationSubject, perturbation: Arc<dyn Perturbation>) -> Self {
        Self {
            id: JobId::new(),
            subject,
            perturbation,
        }
    }

    pub fn for_dataset(dataset: Arc<Dataset>, perturbation: Arc<dyn Perturbation>) -> Self {
        Self::new(PerturbationSubject::Dataset(dataset), perturbation)
    }

    pub fn for_model(model: Arc<dyn Model>, perturbation: Arc<dyn Perturbation>) -> Self {
        Self::new(PerturbationSubject::Model(model), perturbation)
    }

    /// `"<perturbation>-<target>"`, the perturbation part of composite keys.
    pub fn name(&self) -> String {
        format!("{}-{}", self.perturbation.name(), self.perturbation.target())
    }

    pub fn target(&self) -> Target {
        self.perturbation.target()
    }

    pub fn subject(&self) -> &PerturbationSubject {
        &self.subject
    }

    pub fn perturbation(&self) -> &Arc<dyn Perturbation> {
        &self.perturbation
    }

    fn mismatch(&self) -> JobError {
        JobError::TargetMismatch {
            name: self.perturbation.name().to_string(),
            target: self.perturbation.target().to_string(),
            subject: self.subject.kind(),
        }
    }

    /// A copy of the dataset with every sample passed through the
    /// perturbation. Sample identities are kept.
    pub fn apply_to_dataset(&self) -> Result<Dataset, JobError> {
        let PerturbationSubject::Dataset(dataset) = &self.subject else {
            return Err(self.mismatch());
        };
        if self.target() != Target::Dataset {
            return Err(self.mismatch());
        }

        let mut perturbed = dataset.empty_like();
        for sample in dataset.samples() {
            let tensor = self.perturbation.apply(sample.tensor())?;
            perturbed.add_sample(sample.with_tensor(tensor))?;
        }
        debug!(
            "Perturbed {} samples of {} with {}",
            perturbed.len(),
            dataset.file_name(),
            self.name()
        );
        Ok(perturbed)
    }

    /// A perturbed deep copy of the model; the original is untouched.
    ///
    /// Parameter targets rewrite every parameter tensor of the copy;
    /// activation targets wrap the copy's activations.
    pub fn apply_to_model(&self) -> Result<Arc<dyn Model>, JobError> {
        let PerturbationSubject::Model(model) = &self.subject else {
            return Err(self.mismatch());
        };

        let mut copy = model.try_clone()?;
        match self.target() {
            Target::ModelParameter => {
                for param in copy.parameters_mut() {
                    let updated = self.perturbation.apply(param)?;
                    replace_keeping_shape(param, updated)?;
                }
            }
            Target::ModelActivation => {
                copy.wrap_activations(Arc::clone(&self.perturbation))?;
            }
            Target::Dataset => return Err(self.mismatch()),
        }
        debug!("Perturbed model {} with {}", model.file_name(), self.name());
        Ok(Arc::from(copy))
    }
}

fn replace_keeping_shape(param: &mut Tensor, updated: Tensor) -> Result<(), DataError> {
    if updated.shape() != param.shape() {
        return Err(DataError::ShapeMismatch {
            shape: param.shape().to_vec(),
            expected: param.len(),
            actual: updated.len(),
        });
    }
    *param = updated;
    Ok(())
}

impl Job for PerturbationJob {
    fn id(&self) -> &JobId {
        &self.id
    }

    fn execute(&mut self) -> JobResult {
        let outcome = guarded(|| match &self.subject {
            PerturbationSubject::Dataset(_) => self.apply_to_dataset().map(|_| ()),
            PerturbationSubject::Model(_) => self.apply_to_model().map(|_| ()),
        });
        let result = JobResult::from(outcome);
        if let Some(message) = result.message() {
            warn!("Perturbation job {} failed: {}", self.id, message);
        }
        result
    }
}
