//! End-to-end tests for analytics
//!
//! Drives jobs through an `AppContext`, then checks the metrics, the saved
//! records and what a fresh context restores from disk.

use neuroshift_core::{
    AppContext, CollaboratorError, Dataset, JobResult, JobStatus, Model, NeuroshiftConfig,
    Perturbation, Sample, Target, Tensor,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Answers inference calls from a fixed script, one answer per batch item.
struct ScriptedModel {
    answers: Arc<Mutex<VecDeque<(String, f32)>>>,
}

impl ScriptedModel {
    fn new(answers: &[(&str, f32)]) -> Self {
        Self {
            answers: Arc::new(Mutex::new(
                answers.iter().map(|(c, p)| (c.to_string(), *p)).collect(),
            )),
        }
    }
}

impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn file_name(&self) -> &str {
        "scripted.onnx"
    }

    fn infer(&self, batch: &Tensor) -> Result<Vec<(String, f32)>, CollaboratorError> {
        let items = batch.shape().first().copied().unwrap_or(0);
        let mut answers = self.answers.lock().unwrap();
        (0..items)
            .map(|_| {
                answers
                    .pop_front()
                    .ok_or_else(|| CollaboratorError::Inference("script exhausted".to_string()))
            })
            .collect()
    }

    fn try_clone(&self) -> Result<Box<dyn Model>, CollaboratorError> {
        Ok(Box::new(Self {
            answers: Arc::clone(&self.answers),
        }))
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    fn wrap_activations(
        &mut self,
        _perturbation: Arc<dyn Perturbation>,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Fails every call.
struct Noise;

impl Perturbation for Noise {
    fn name(&self) -> &str {
        "noise"
    }

    fn target(&self) -> Target {
        Target::Dataset
    }

    fn apply(&self, _tensor: &Tensor) -> Result<Tensor, CollaboratorError> {
        Err(CollaboratorError::Perturbation("sigma must be positive".to_string()))
    }
}

struct TestEnv {
    _temp: TempDir,
    config: NeuroshiftConfig,
}

impl TestEnv {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let mut config = NeuroshiftConfig::default();
        config.workers = 3;
        config.paths.analytics = temp.path().join("analytics");
        config.paths.datasets = temp.path().join("datasets");
        Self {
            _temp: temp,
            config,
        }
    }

    fn analytics_dir(&self) -> PathBuf {
        self.config.paths.analytics.clone()
    }

    fn start(&self) -> AppContext {
        AppContext::start(self.config.clone()).expect("Failed to start context")
    }
}

/// Ten digit classes, two samples of class "1".
fn two_ones() -> Dataset {
    let classes = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "0"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let mut dataset = Dataset::new("mnist.zip", "MNIST", "Handwritten digits", classes, 2).unwrap();
    for i in 0..2 {
        dataset
            .add_sample(Sample::new(
                format!("one_{}", i),
                format!("/mnist/one_{}.png", i),
                Some("1".to_string()),
                Tensor::new(vec![2, 2], vec![0.0, 1.0, 1.0, 0.0]).unwrap(),
            ))
            .unwrap();
    }
    dataset
}

// ============================================================================
// Metrics
// ============================================================================

#[test]
fn test_two_prediction_scenario_through_context() {
    let env = TestEnv::new();
    let ctx = env.start();
    let model: Arc<dyn Model> = Arc::new(ScriptedModel::new(&[("1", 0.99), ("2", 0.78)]));

    let id = ctx.start_inference(model, Arc::new(two_ones()));
    ctx.wait_until_idle();
    assert_eq!(ctx.job_status(&id), Some(JobStatus::Finished(JobResult::Success)));

    let acc = ctx.registry().get_by_id(&id).unwrap();
    assert_eq!(acc.key().as_str(), "scripted.onnx mnist.zip N");
    assert!(acc.is_done());
    assert!((acc.overall_accuracy() - 0.9).abs() < 1e-9);
    assert!((acc.overall_precision() - 0.1).abs() < 1e-9);
    assert!((acc.overall_recall() - 0.05).abs() < 1e-9);
    assert!((acc.overall_f1() - 0.0667).abs() < 1e-4);

    let csv = String::from_utf8(acc.export_csv().unwrap()).unwrap();
    assert_eq!(
        csv,
        "Predicted class,Confidence,Correct prediction\n1,0.99,true\n2,0.78,false\n"
    );
    ctx.shutdown();
}

#[test]
fn test_failed_perturbation_is_reported_not_raised() {
    let env = TestEnv::new();
    let ctx = env.start();
    let model: Arc<dyn Model> = Arc::new(ScriptedModel::new(&[]));

    let id = ctx.start_dataset_shift(model, Arc::new(two_ones()), Arc::new(Noise));
    ctx.wait_until_idle();

    match ctx.job_status(&id) {
        Some(JobStatus::Finished(JobResult::Failure { message })) => {
            assert_eq!(message, "Perturbation failed: sigma must be positive")
        }
        other => panic!("unexpected status: {:?}", other),
    }
    let acc = ctx.registry().get_by_id(&id).unwrap();
    assert!(acc.is_done());
    assert_eq!(acc.prediction_count(), 0);
    assert_eq!(acc.key().as_str(), "scripted.onnx mnist.zip noise-Dataset");
    assert_eq!(ctx.queue().stats().failed, 1);
    ctx.shutdown();
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_saved_reference_survives_restart() {
    let env = TestEnv::new();
    let (saved_id, unsaved_id) = {
        let ctx = env.start();
        let first: Arc<dyn Model> = Arc::new(ScriptedModel::new(&[("1", 0.99), ("2", 0.78)]));
        let second: Arc<dyn Model> = Arc::new(ScriptedModel::new(&[("1", 0.5), ("1", 0.5)]));
        let saved_id = ctx.start_inference(first, Arc::new(two_ones()));
        ctx.wait_until_idle();
        let unsaved_id = ctx.start_inference(second, Arc::new(two_ones()));
        ctx.wait_until_idle();

        let registry = ctx.registry();
        let acc = registry.get_by_id(&saved_id).unwrap();
        assert!(registry.save(&acc, "Baseline", "Unperturbed run").unwrap());
        assert!(!registry.save(&acc, "Again", "").unwrap());
        assert!(registry.set_reference(&saved_id));

        let path = registry.record_path(&acc).unwrap();
        assert!(path.starts_with(env.analytics_dir()));
        assert!(path.exists());
        ctx.shutdown();
        (saved_id, unsaved_id)
    };

    let ctx = env.start();
    let registry = ctx.registry();
    assert_eq!(registry.saved().len(), 1);
    assert!(registry.get_by_id(&unsaved_id).is_none());

    let reference = registry.reference().unwrap();
    assert_eq!(reference.job_id(), &saved_id);
    assert_eq!(reference.display_name(), "Baseline");
    assert_eq!(reference.description(), "Unperturbed run");
    assert_eq!(reference.prediction_count(), 2);
    assert!((reference.overall_accuracy() - 0.9).abs() < 1e-9);
    assert_eq!(reference.result(), Some(JobResult::Success));
    assert_eq!(
        ctx.job_status(&saved_id),
        Some(JobStatus::Finished(JobResult::Success))
    );
    ctx.shutdown();
}

#[test]
fn test_deleted_analytic_is_gone_after_restart() {
    let env = TestEnv::new();
    let id = {
        let ctx = env.start();
        let model: Arc<dyn Model> = Arc::new(ScriptedModel::new(&[("1", 0.9), ("1", 0.9)]));
        let id = ctx.start_inference(model, Arc::new(two_ones()));
        ctx.wait_until_idle();
        ctx.registry().save_all().unwrap();
        assert!(ctx.registry().set_reference(&id));
        assert!(ctx.registry().delete_by_id(&id).unwrap());
        assert!(ctx.registry().reference().is_none());
        ctx.shutdown();
        id
    };

    let ctx = env.start();
    assert!(ctx.registry().get_by_id(&id).is_none());
    assert!(ctx.registry().saved().is_empty());
    ctx.shutdown();
}

#[test]
fn test_datasets_persist_through_catalog() {
    let env = TestEnv::new();
    {
        let ctx = env.start();
        let mut datasets = ctx.datasets();
        datasets.add(two_ones()).unwrap();
        datasets.save_all().unwrap();
    }

    let ctx = env.start();
    let datasets = ctx.datasets();
    assert_eq!(datasets.names(), vec!["mnist.zip"]);
    let restored = datasets.selected().unwrap();
    assert_eq!(restored.classes().len(), 10);
    assert_eq!(restored.len(), 2);
}
