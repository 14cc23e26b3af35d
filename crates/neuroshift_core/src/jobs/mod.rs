//! Executable jobs
//!
//! A job is constructed by a controller (which registers its accumulator in
//! the [`MetricsRegistry`](crate::MetricsRegistry) right away), handed to the
//! [`JobQueue`](crate::JobQueue), and executed exactly once by a worker.
//!
//! Failures never escape `execute`: collaborator errors and panics become
//! [`JobResult::Failure`] and the job's accumulator is force-completed.

pub mod attack;
pub mod inference;
pub mod perturbation;

pub use attack::AttackJob;
pub use inference::InferenceJob;
pub use perturbation::{PerturbationJob, PerturbationSubject};

use crate::error::JobError;
use crate::metrics::MetricsAccumulator;
use neuroshift_ids::JobId;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

const UNKNOWN_FAILURE: &str = "Job failed without an error message";

/// Outcome of one job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    Success,
    Failure { message: String },
}

impl JobResult {
    /// Failure with a guaranteed non-empty message.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            UNKNOWN_FAILURE.to_string()
        } else {
            message
        };
        JobResult::Failure { message }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success)
    }

    /// Error message; `None` on success.
    pub fn message(&self) -> Option<&str> {
        match self {
            JobResult::Success => None,
            JobResult::Failure { message } => Some(message),
        }
    }
}

impl From<Result<(), JobError>> for JobResult {
    fn from(outcome: Result<(), JobError>) -> Self {
        match outcome {
            Ok(()) => JobResult::Success,
            Err(e) => JobResult::failure(e.to_string()),
        }
    }
}

/// A unit of work the queue can run.
pub trait Job: Send {
    fn id(&self) -> &JobId;

    /// Run the job to completion. Called once per job.
    fn execute(&mut self) -> JobResult;
}

/// The concrete job kinds. Controllers submit every job as one of these.
pub enum JobKind {
    Inference(InferenceJob),
    Attack(AttackJob),
    Perturbation(PerturbationJob),
}

impl JobKind {
    pub fn kind(&self) -> &'static str {
        match self {
            JobKind::Inference(_) => "inference",
            JobKind::Attack(_) => "attack",
            JobKind::Perturbation(_) => "perturbation",
        }
    }
}

impl Job for JobKind {
    fn id(&self) -> &JobId {
        match self {
            JobKind::Inference(job) => job.id(),
            JobKind::Attack(job) => job.id(),
            JobKind::Perturbation(job) => job.id(),
        }
    }

    fn execute(&mut self) -> JobResult {
        match self {
            JobKind::Inference(job) => job.execute(),
            JobKind::Attack(job) => job.execute(),
            JobKind::Perturbation(job) => job.execute(),
        }
    }
}

impl From<InferenceJob> for JobKind {
    fn from(job: InferenceJob) -> Self {
        JobKind::Inference(job)
    }
}

impl From<AttackJob> for JobKind {
    fn from(job: AttackJob) -> Self {
        JobKind::Attack(job)
    }
}

impl From<PerturbationJob> for JobKind {
    fn from(job: PerturbationJob) -> Self {
        JobKind::Perturbation(job)
    }
}

/// Bookkeeping shared by jobs that produce predictions.
pub(crate) struct JobCore {
    id: JobId,
    accumulator: Arc<MetricsAccumulator>,
}

impl JobCore {
    pub(crate) fn new(id: JobId, accumulator: Arc<MetricsAccumulator>) -> Self {
        Self { id, accumulator }
    }

    pub(crate) fn id(&self) -> &JobId {
        &self.id
    }

    pub(crate) fn accumulator(&self) -> &Arc<MetricsAccumulator> {
        &self.accumulator
    }

    /// Run `work`, record its outcome on the accumulator and return it.
    ///
    /// The result is stored together with the done flag. On failure the
    /// accumulator keeps whatever predictions it already holds.
    pub(crate) fn run(&self, work: impl FnOnce() -> Result<(), JobError>) -> JobResult {
        let result = JobResult::from(guarded(work));
        if let Some(message) = result.message() {
            warn!("Job {} failed: {}", self.id, message);
        }
        self.accumulator.finish(result.clone());
        result
    }
}

/// Call `work`, turning a panic into [`JobError::Panicked`].
pub(crate) fn guarded<T>(work: impl FnOnce() -> Result<T, JobError>) -> Result<T, JobError> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Collaborators with scripted behavior.

    use crate::collaborators::{Attack, Model, Perturbation};
    use crate::data::{Dataset, Sample, Target, Tensor};
    use crate::error::CollaboratorError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Predicts the class whose index is the first element of each item plus
    /// `bias`, rounded.
    pub struct ThresholdModel {
        pub classes: Vec<String>,
        pub bias: Tensor,
        pub activation: Option<Arc<dyn Perturbation>>,
        pub fail_after: Option<usize>,
        pub calls: Arc<AtomicUsize>,
    }

    impl ThresholdModel {
        pub fn new(classes: &[&str]) -> Self {
            Self {
                classes: classes.iter().map(|c| c.to_string()).collect(),
                bias: Tensor::zeros(vec![1]),
                activation: None,
                fail_after: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Model for ThresholdModel {
        fn name(&self) -> &str {
            "Threshold"
        }

        fn file_name(&self) -> &str {
            "threshold.onnx"
        }

        fn infer(&self, batch: &Tensor) -> Result<Vec<(String, f32)>, CollaboratorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| call >= limit) {
                return Err(CollaboratorError::Inference("device lost".to_string()));
            }
            let batch = match &self.activation {
                Some(p) => p.apply(batch)?,
                None => batch.clone(),
            };
            let items = batch.shape().first().copied().unwrap_or(0);
            let width = if items == 0 { 0 } else { batch.len() / items };
            Ok((0..items)
                .map(|i| {
                    let value = batch.data()[i * width] + self.bias.data()[0];
                    let idx = (value.round().max(0.0) as usize).min(self.classes.len() - 1);
                    (self.classes[idx].clone(), 0.9)
                })
                .collect())
        }

        fn try_clone(&self) -> Result<Box<dyn Model>, CollaboratorError> {
            Ok(Box::new(Self {
                classes: self.classes.clone(),
                bias: self.bias.clone(),
                activation: self.activation.clone(),
                fail_after: self.fail_after,
                calls: Arc::clone(&self.calls),
            }))
        }

        fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
            vec![&mut self.bias]
        }

        fn wrap_activations(
            &mut self,
            perturbation: Arc<dyn Perturbation>,
        ) -> Result<(), CollaboratorError> {
            self.activation = Some(perturbation);
            Ok(())
        }
    }

    /// Adds a constant to every element.
    pub struct Shift {
        pub amount: f32,
        pub target: Target,
    }

    impl Perturbation for Shift {
        fn name(&self) -> &str {
            "shift"
        }

        fn target(&self) -> Target {
            self.target
        }

        fn apply(&self, tensor: &Tensor) -> Result<Tensor, CollaboratorError> {
            let amount = self.amount;
            Ok(tensor.map(|v| v + amount))
        }
    }

    /// Pushes every element to the given value.
    pub struct Flatten(pub f32);

    impl Attack for Flatten {
        fn name(&self) -> &str {
            "flatten"
        }

        fn apply(&self, _model: &dyn Model, input: &Tensor) -> Result<Tensor, CollaboratorError> {
            let value = self.0;
            Ok(input.map(|_| value))
        }
    }

    /// Dataset of `n` one-element samples; sample `i` holds value `i % 3`
    /// and is labelled with class `i % 3`.
    pub fn digits(n: usize, batch_size: usize) -> Dataset {
        let classes = vec!["0".to_string(), "1".to_string(), "2".to_string()];
        let mut dataset = Dataset::new("digits.zip", "Digits", "", classes, batch_size).unwrap();
        for i in 0..n {
            let class = i % 3;
            dataset
                .add_sample(Sample::new(
                    format!("img{}", i),
                    format!("/digits/img{}.png", i),
                    Some(class.to_string()),
                    Tensor::new(vec![1], vec![class as f32]).unwrap(),
                ))
                .unwrap();
        }
        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_never_empty() {
        assert_eq!(JobResult::failure("").message(), Some(UNKNOWN_FAILURE));
        assert_eq!(JobResult::failure("  ").message(), Some(UNKNOWN_FAILURE));
        assert_eq!(JobResult::failure("boom").message(), Some("boom"));
        assert_eq!(JobResult::Success.message(), None);
    }

    #[test]
    fn test_guarded_converts_panics() {
        let outcome: Result<(), JobError> = guarded(|| panic!("kaboom"));
        match outcome {
            Err(JobError::Panicked(message)) => assert_eq!(message, "kaboom"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_job_kind_dispatches_to_inner_job() {
        use crate::data::Target;
        use crate::metrics::MetricsRegistry;

        let temp = tempfile::TempDir::new().unwrap();
        let registry = MetricsRegistry::new(temp.path(), &["key"]).unwrap();
        let inference = InferenceJob::new(
            &registry,
            Arc::new(fakes::ThresholdModel::new(&["0", "1", "2"])),
            Arc::new(fakes::digits(3, 3)),
            None,
        );
        let id = inference.id().clone();

        let mut job = JobKind::from(inference);
        assert_eq!(job.kind(), "inference");
        assert_eq!(job.id(), &id);
        assert!(job.execute().is_success());
        assert_eq!(registry.get_by_id(&id).unwrap().prediction_count(), 3);

        let mut shift = JobKind::from(PerturbationJob::for_dataset(
            Arc::new(fakes::digits(2, 2)),
            Arc::new(fakes::Shift {
                amount: 1.0,
                target: Target::Dataset,
            }),
        ));
        assert_eq!(shift.kind(), "perturbation");
        assert!(shift.execute().is_success());
    }

    #[test]
    fn test_job_result_serialization() {
        let json = serde_json::to_string(&JobResult::failure("bad batch")).unwrap();
        assert_eq!(json, r#"{"status":"failure","message":"bad batch"}"#);
        let back: JobResult = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(back.is_success());
    }
}
