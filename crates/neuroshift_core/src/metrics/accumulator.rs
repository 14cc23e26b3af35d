//! Incremental classification metrics for one job.
//!
//! Counters are kept per class in one-vs-rest form. True negatives are not
//! stored: for `n` predictions, `tn = n - tp - fp - fn`, which keeps every
//! update O(1) and the counters recomputable from the prediction list.

use crate::data::{Dataset, Prediction, Sample};
use crate::error::AccumulatorError;
use crate::jobs::JobResult;
use neuroshift_ids::JobId;
use neuroshift_store::{Entity, FieldValue};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

const MISSING_PART: &str = "N";
const DEFAULT_DESCRIPTION: &str = "No description.";
const CSV_HEADER: [&str; 3] = ["Predicted class", "Confidence", "Correct prediction"];

/// Process-wide counter behind auto-assigned display names.
static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_display_name() -> String {
    let n = NAME_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("Analytic {}", n)
}

/// `"<model> <dataset> <perturbation>"`, with `N` for a missing part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn new(model: Option<&str>, dataset: Option<&str>, perturbation: Option<&str>) -> Self {
        Self(format!(
            "{} {} {}",
            model.unwrap_or(MISSING_PART),
            dataset.unwrap_or(MISSING_PART),
            perturbation.unwrap_or(MISSING_PART)
        ))
    }

    /// Use an explicit key verbatim.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One-vs-rest confusion counts for a single class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounts {
    pub true_positive: u64,
    pub true_negative: u64,
    pub false_positive: u64,
    pub false_negative: u64,
}

impl ConfusionCounts {
    fn total(&self) -> u64 {
        self.true_positive + self.true_negative + self.false_positive + self.false_negative
    }

    fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / (precision + recall)
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    tp: u64,
    fp: u64,
    fn_: u64,
}

#[derive(Debug, Default)]
struct State {
    predictions: Vec<Prediction>,
    /// Known classes in first-seen order; every one has an entry in `counters`.
    classes: Vec<String>,
    counters: HashMap<String, Counters>,
    done: bool,
    reference: bool,
    name: Option<String>,
    description: Option<String>,
    result: Option<JobResult>,
}

impl State {
    fn observe_class(&mut self, class: &str) {
        if !self.counters.contains_key(class) {
            self.counters.insert(class.to_string(), Counters::default());
            self.classes.push(class.to_string());
        }
    }

    fn record(&mut self, prediction: Prediction) {
        let predicted = prediction.predicted_class().to_string();
        self.observe_class(&predicted);
        if let Some(actual) = prediction.actual_class() {
            self.observe_class(actual);
        }

        if prediction.is_correct() {
            self.counters.entry(predicted).or_default().tp += 1;
        } else {
            self.counters.entry(predicted).or_default().fp += 1;
            if let Some(actual) = prediction.actual_class() {
                self.counters.entry(actual.to_string()).or_default().fn_ += 1;
            }
        }
        self.predictions.push(prediction);
    }

    fn confusion(&self, class: &str) -> Option<ConfusionCounts> {
        let c = self.counters.get(class).copied()?;
        let n = self.predictions.len() as u64;
        Some(ConfusionCounts {
            true_positive: c.tp,
            true_negative: n.saturating_sub(c.tp + c.fp + c.fn_),
            false_positive: c.fp,
            false_negative: c.fn_,
        })
    }

    fn class_metric(&self, class: &str, metric: fn(&ConfusionCounts) -> f64) -> f64 {
        self.confusion(class).map_or(0.0, |c| metric(&c))
    }

    /// Unweighted mean over every known class.
    fn overall(&self, metric: fn(&ConfusionCounts) -> f64) -> f64 {
        if self.predictions.is_empty() || self.classes.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .classes
            .iter()
            .map(|class| self.class_metric(class, metric))
            .sum();
        sum / self.classes.len() as f64
    }
}

/// Evolving confusion matrix and prediction list for one job.
///
/// `job_id` and `key` are fixed at construction; everything else sits behind
/// a mutex so workers can append while other threads read metrics.
pub struct MetricsAccumulator {
    job_id: JobId,
    key: CompositeKey,
    total_predictions: usize,
    state: Mutex<State>,
}

impl MetricsAccumulator {
    /// Accumulator expecting `total_predictions` results, keyed by the names
    /// of the model, dataset and perturbation involved.
    ///
    /// Classes start as the dataset's declared classes.
    pub fn new(
        job_id: JobId,
        total_predictions: usize,
        model: Option<&str>,
        dataset: Option<&Dataset>,
        perturbation: Option<&str>,
    ) -> Self {
        let key = CompositeKey::new(model, dataset.map(|d| d.file_name()), perturbation);
        let classes = dataset.map(|d| d.classes().to_vec()).unwrap_or_default();
        Self::with_key(job_id, total_predictions, key, classes)
    }

    /// Accumulator with an explicit composite key and seed classes.
    pub fn with_key(
        job_id: JobId,
        total_predictions: usize,
        key: CompositeKey,
        classes: Vec<String>,
    ) -> Self {
        let mut state = State {
            done: total_predictions == 0,
            ..State::default()
        };
        for class in &classes {
            state.observe_class(class);
        }
        Self {
            job_id,
            key,
            total_predictions,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn key(&self) -> &CompositeKey {
        &self.key
    }

    pub fn total_predictions(&self) -> usize {
        self.total_predictions
    }

    /// Append one prediction; marks the accumulator done when the expected
    /// total is reached.
    pub fn add_prediction(&self, prediction: Prediction) -> Result<(), AccumulatorError> {
        self.add_predictions(std::iter::once(prediction))
    }

    /// Append predictions in order.
    ///
    /// Predictions arriving after the accumulator is done are dropped and
    /// reported as [`AccumulatorError::Completed`].
    pub fn add_predictions(
        &self,
        predictions: impl IntoIterator<Item = Prediction>,
    ) -> Result<(), AccumulatorError> {
        let mut state = self.lock();
        let mut dropped = 0;
        for prediction in predictions {
            if state.done {
                dropped += 1;
                continue;
            }
            state.record(prediction);
            if state.predictions.len() >= self.total_predictions {
                state.done = true;
            }
        }
        if dropped > 0 {
            return Err(AccumulatorError::Completed { dropped });
        }
        Ok(())
    }

    /// Force completion, e.g. after a failure. Partial results stay readable.
    pub fn mark_done(&self) {
        self.lock().done = true;
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Fraction of expected predictions received, `0` when none are expected.
    pub fn progress(&self) -> f64 {
        if self.total_predictions == 0 {
            return 0.0;
        }
        self.lock().predictions.len() as f64 / self.total_predictions as f64
    }

    pub fn prediction_count(&self) -> usize {
        self.lock().predictions.len()
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        self.lock().predictions.clone()
    }

    /// First prediction made for `input`.
    pub fn prediction_for_input(&self, input: &Sample) -> Option<Prediction> {
        self.lock()
            .predictions
            .iter()
            .find(|p| p.input().as_ref() == input)
            .cloned()
    }

    /// Known classes: seeded ones first, then others in first-seen order.
    pub fn classes(&self) -> Vec<String> {
        self.lock().classes.clone()
    }

    /// Confusion counts for a known class.
    pub fn confusion(&self, class: &str) -> Option<ConfusionCounts> {
        self.lock().confusion(class)
    }

    pub fn class_accuracy(&self, class: &str) -> f64 {
        self.lock().class_metric(class, ConfusionCounts::accuracy)
    }

    pub fn class_precision(&self, class: &str) -> f64 {
        self.lock().class_metric(class, ConfusionCounts::precision)
    }

    pub fn class_recall(&self, class: &str) -> f64 {
        self.lock().class_metric(class, ConfusionCounts::recall)
    }

    pub fn class_f1(&self, class: &str) -> f64 {
        self.lock().class_metric(class, ConfusionCounts::f1)
    }

    pub fn overall_accuracy(&self) -> f64 {
        self.lock().overall(ConfusionCounts::accuracy)
    }

    pub fn overall_precision(&self) -> f64 {
        self.lock().overall(ConfusionCounts::precision)
    }

    pub fn overall_recall(&self) -> f64 {
        self.lock().overall(ConfusionCounts::recall)
    }

    pub fn overall_f1(&self) -> f64 {
        self.lock().overall(ConfusionCounts::f1)
    }

    pub fn set_result(&self, result: JobResult) {
        self.lock().result = Some(result);
    }

    /// Store the job's outcome and mark the accumulator done in one step, so
    /// a caller that sees `is_done()` after this also sees `result()`.
    pub fn finish(&self, result: JobResult) {
        let mut state = self.lock();
        state.result = Some(result);
        state.done = true;
    }

    /// Outcome of the job, once it has finished.
    pub fn result(&self) -> Option<JobResult> {
        self.lock().result.clone()
    }

    pub fn is_reference(&self) -> bool {
        self.lock().reference
    }

    pub(crate) fn set_reference_flag(&self, reference: bool) {
        self.lock().reference = reference;
    }

    /// Display name, assigned from a process-wide counter on first use.
    pub fn display_name(&self) -> String {
        let mut state = self.lock();
        state.name.get_or_insert_with(next_display_name).clone()
    }

    pub fn set_display_name(&self, name: impl Into<String>) {
        self.lock().name = Some(name.into());
    }

    pub fn description(&self) -> String {
        self.lock()
            .description
            .clone()
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string())
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.lock().description = Some(description.into());
    }

    /// `Predicted class,Confidence,Correct prediction` rows in insertion order.
    pub fn export_csv(&self) -> Result<Vec<u8>, AccumulatorError> {
        let predictions = self.predictions();
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADER)?;
        for prediction in &predictions {
            writer.write_record([
                prediction.predicted_class().to_string(),
                prediction.confidence().to_string(),
                prediction.is_correct().to_string(),
            ])?;
        }
        writer
            .into_inner()
            .map_err(|e| AccumulatorError::Export(e.to_string()))
    }
}

impl fmt::Debug for MetricsAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MetricsAccumulator")
            .field("job_id", &self.job_id)
            .field("key", &self.key)
            .field("total_predictions", &self.total_predictions)
            .field("predictions", &state.predictions.len())
            .field("done", &state.done)
            .field("reference", &state.reference)
            .finish()
    }
}

impl fmt::Display for MetricsAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl Entity for MetricsAccumulator {
    const FIELDS: &'static [&'static str] = &["job_id", "key"];

    fn immutable_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("job_id", self.job_id.as_str().into()),
            ("key", self.key.as_str().into()),
        ]
    }
}

/// On-disk form. Counters are rebuilt from `predictions` on load.
#[derive(Serialize)]
struct RecordRef<'a> {
    job_id: &'a JobId,
    key: &'a CompositeKey,
    total_predictions: usize,
    classes: &'a [String],
    predictions: &'a [Prediction],
    done: bool,
    reference: bool,
    name: Option<&'a str>,
    description: Option<&'a str>,
    result: Option<&'a JobResult>,
}

#[derive(Deserialize)]
struct Record {
    job_id: JobId,
    key: CompositeKey,
    total_predictions: usize,
    #[serde(default)]
    classes: Vec<String>,
    #[serde(default)]
    predictions: Vec<Prediction>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    reference: bool,
    name: Option<String>,
    description: Option<String>,
    result: Option<JobResult>,
}

impl Serialize for MetricsAccumulator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let state = self.lock();
        RecordRef {
            job_id: &self.job_id,
            key: &self.key,
            total_predictions: self.total_predictions,
            classes: &state.classes,
            predictions: &state.predictions,
            done: state.done,
            reference: state.reference,
            name: state.name.as_deref(),
            description: state.description.as_deref(),
            result: state.result.as_ref(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MetricsAccumulator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = Record::deserialize(deserializer)?;
        let accumulator =
            Self::with_key(record.job_id, record.total_predictions, record.key, record.classes);
        {
            let mut state = accumulator.lock();
            for prediction in record.predictions {
                state.record(prediction);
            }
            state.done = record.done || state.predictions.len() >= record.total_predictions;
            state.reference = record.reference;
            state.name = record.name;
            state.description = record.description;
            state.result = record.result;
        }
        Ok(accumulator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Tensor;
    use std::sync::Arc;

    fn digits() -> Dataset {
        let classes = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "0"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        Dataset::new("mnist.zip", "MNIST", "", classes, 32).unwrap()
    }

    fn prediction(actual: &str, predicted: &str, confidence: f32) -> Prediction {
        let input = Arc::new(Sample::new(
            format!("{}-{}", actual, predicted),
            "/tmp/x.png",
            Some(actual.to_string()),
            Tensor::zeros(vec![1]),
        ));
        Prediction::new(Arc::clone(&input), input, predicted, confidence)
    }

    fn accumulator(total: usize) -> MetricsAccumulator {
        MetricsAccumulator::new(JobId::new(), total, Some("lenet.onnx"), Some(&digits()), None)
    }

    #[test]
    fn test_composite_key_fills_missing_parts() {
        assert_eq!(
            CompositeKey::new(Some("m.onnx"), None, Some("gauss-Dataset")).as_str(),
            "m.onnx N gauss-Dataset"
        );
        assert_eq!(CompositeKey::new(None, None, None).as_str(), "N N N");
    }

    #[test]
    fn test_two_prediction_scenario() {
        let acc = accumulator(2);
        acc.add_prediction(prediction("1", "1", 0.99)).unwrap();
        acc.add_prediction(prediction("1", "2", 0.78)).unwrap();

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
    }

    #[test]
    fn test_confusion_counts() {
        let acc = accumulator(3);
        acc.add_predictions(vec![
            prediction("1", "1", 0.9),
            prediction("1", "2", 0.8),
            prediction("2", "2", 0.7),
        ])
        .unwrap();

        assert_eq!(
            acc.confusion("1").unwrap(),
            ConfusionCounts {
                true_positive: 1,
                true_negative: 1,
                false_positive: 0,
                false_negative: 1,
            }
        );
        assert_eq!(
            acc.confusion("2").unwrap(),
            ConfusionCounts {
                true_positive: 1,
                true_negative: 1,
                false_positive: 1,
                false_negative: 0,
            }
        );
        assert_eq!(acc.confusion("3").unwrap().true_negative, 3);
        assert!(acc.confusion("cat").is_none());
        assert_eq!(acc.class_precision("cat"), 0.0);
    }

    #[test]
    fn test_batch_and_single_adds_agree() {
        let stream = vec![
            prediction("1", "1", 0.9),
            prediction("2", "7", 0.4),
            prediction("7", "7", 0.8),
            prediction("3", "3", 0.6),
            prediction("3", "8", 0.3),
            prediction("0", "0", 0.99),
        ];

        let single = accumulator(stream.len());
        for p in stream.clone() {
            single.add_prediction(p).unwrap();
        }
        let batch = accumulator(stream.len());
        batch.add_predictions(stream).unwrap();

        for class in single.classes() {
            assert_eq!(single.confusion(&class), batch.confusion(&class));
        }
        assert_eq!(single.overall_accuracy(), batch.overall_accuracy());
        assert_eq!(single.overall_precision(), batch.overall_precision());
        assert_eq!(single.overall_recall(), batch.overall_recall());
        assert_eq!(single.overall_f1(), batch.overall_f1());
    }

    #[test]
    fn test_progress_and_done() {
        let acc = accumulator(4);
        assert_eq!(acc.progress(), 0.0);
        assert!(!acc.is_done());

        for k in 1..=4 {
            acc.add_prediction(prediction("1", "1", 0.5)).unwrap();
            assert_eq!(acc.progress(), k as f64 / 4.0);
            assert_eq!(acc.is_done(), k == 4);
        }
    }

    #[test]
    fn test_no_appends_after_done() {
        let acc = accumulator(2);
        let err = acc
            .add_predictions(vec![
                prediction("1", "1", 0.5),
                prediction("1", "1", 0.5),
                prediction("1", "2", 0.5),
            ])
            .unwrap_err();
        assert_eq!(err, AccumulatorError::Completed { dropped: 1 });
        assert_eq!(acc.prediction_count(), 2);

        acc.mark_done();
        assert!(acc.add_prediction(prediction("2", "2", 0.5)).is_err());
        assert_eq!(acc.prediction_count(), 2);
    }

    #[test]
    fn test_empty_accumulator_metrics_are_zero() {
        let acc = accumulator(10);
        assert_eq!(acc.overall_accuracy(), 0.0);
        assert_eq!(acc.overall_precision(), 0.0);
        assert_eq!(acc.overall_recall(), 0.0);
        assert_eq!(acc.overall_f1(), 0.0);

        let bare = MetricsAccumulator::with_key(JobId::new(), 0, CompositeKey::from_raw("k"), vec![]);
        assert!(bare.is_done());
        assert_eq!(bare.progress(), 0.0);
        assert_eq!(bare.overall_f1(), 0.0);
    }

    #[test]
    fn test_classes_extend_in_first_seen_order() {
        let acc = MetricsAccumulator::with_key(
            JobId::new(),
            2,
            CompositeKey::from_raw("k"),
            vec!["cat".to_string()],
        );
        acc.add_prediction(prediction("dog", "bird", 0.5)).unwrap();
        assert_eq!(acc.classes(), vec!["cat", "bird", "dog"]);
    }

    #[test]
    fn test_seeded_duplicates_collapse() {
        let acc = MetricsAccumulator::with_key(
            JobId::new(),
            1,
            CompositeKey::from_raw("k"),
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
        );
        acc.add_prediction(prediction("b", "a", 0.5)).unwrap();
        assert_eq!(acc.classes(), vec!["a", "b"]);
        assert_eq!(acc.confusion("a").unwrap().false_positive, 1);
        assert_eq!(acc.confusion("b").unwrap().false_negative, 1);
    }

    #[test]
    fn test_updates_do_not_scale_with_class_count() {
        let classes: Vec<String> = (0..10_000).map(|i| format!("c{}", i)).collect();
        let acc = MetricsAccumulator::with_key(
            JobId::new(),
            20_000,
            CompositeKey::from_raw("k"),
            classes,
        );
        let stream: Vec<Prediction> = (0..20_000)
            .map(|i| {
                let actual = format!("c{}", 9_999 - i % 100);
                prediction(&actual, &actual, 0.5)
            })
            .collect();

        let started = std::time::Instant::now();
        acc.add_predictions(stream).unwrap();
        assert!(
            started.elapsed() < std::time::Duration::from_secs(1),
            "20k updates over 10k classes took {:?}",
            started.elapsed()
        );

        assert!(acc.is_done());
        assert_eq!(acc.classes().len(), 10_000);
        assert_eq!(acc.confusion("c9999").unwrap().true_positive, 200);
        assert_eq!(acc.confusion("c0").unwrap().true_negative, 20_000);
    }

    #[test]
    fn test_finish_sets_result_and_done_together() {
        let acc = accumulator(3);
        acc.add_prediction(prediction("1", "1", 0.5)).unwrap();
        assert!(!acc.is_done());
        assert!(acc.result().is_none());

        acc.finish(JobResult::failure("disk full"));
        assert!(acc.is_done());
        assert_eq!(acc.result().unwrap().message(), Some("disk full"));
        assert_eq!(acc.prediction_count(), 1);
    }

    #[test]
    fn test_metrics_readable_while_worker_appends() {
        let acc = Arc::new(accumulator(2_000));
        let writer = {
            let acc = Arc::clone(&acc);
            std::thread::spawn(move || {
                for chunk in 0..200 {
                    let batch: Vec<Prediction> = (0..10)
                        .map(|i| {
                            let actual = ((chunk + i) % 10).to_string();
                            let predicted = if i % 3 == 0 { "1".to_string() } else { actual.clone() };
                            prediction(&actual, &predicted, 0.5)
                        })
                        .collect();
                    acc.add_predictions(batch).unwrap();
                }
            })
        };

        let mut last_progress = 0.0;
        while !acc.is_done() && !writer.is_finished() {
            let progress = acc.progress();
            assert!(progress >= last_progress);
            assert!(progress <= 1.0);
            last_progress = progress;
            for metric in [
                acc.overall_accuracy(),
                acc.overall_precision(),
                acc.overall_recall(),
                acc.overall_f1(),
            ] {
                assert!((0.0..=1.0).contains(&metric), "metric out of range: {}", metric);
            }
        }
        writer.join().unwrap();

        assert_eq!(acc.progress(), 1.0);
        assert_eq!(acc.prediction_count(), 2_000);
        let counted: u64 = acc
            .classes()
            .iter()
            .map(|c| acc.confusion(c).unwrap().true_positive)
            .sum();
        let correct = acc.predictions().iter().filter(|p| p.is_correct()).count();
        assert_eq!(counted, correct as u64);
    }

    #[test]
    fn test_prediction_for_input_returns_first_match() {
        let acc = accumulator(3);
        let first = prediction("4", "4", 0.9);
        let input = first.input().as_ref().clone();
        acc.add_predictions(vec![first, prediction("4", "4", 0.1)]).unwrap();

        let found = acc.prediction_for_input(&input).unwrap();
        assert_eq!(found.confidence(), 0.9);
    }

    #[test]
    fn test_display_fields() {
        let acc = accumulator(1);
        assert_eq!(acc.description(), "No description.");
        let name = acc.display_name();
        assert!(name.starts_with("Analytic "));
        assert_eq!(acc.display_name(), name);

        acc.set_display_name("baseline");
        acc.set_description("clean MNIST run");
        assert_eq!(acc.display_name(), "baseline");
        assert_eq!(acc.description(), "clean MNIST run");
    }

    #[test]
    fn test_serde_rebuilds_counters() {
        let acc = accumulator(2);
        acc.add_predictions(vec![prediction("1", "1", 0.99), prediction("1", "2", 0.78)])
            .unwrap();
        acc.set_result(JobResult::Success);
        acc.set_display_name("run");

        let json = serde_json::to_string(&acc).unwrap();
        let back: MetricsAccumulator = serde_json::from_str(&json).unwrap();

        assert_eq!(back.job_id(), acc.job_id());
        assert_eq!(back.key(), acc.key());
        assert!(back.is_done());
        assert_eq!(back.result(), Some(JobResult::Success));
        assert_eq!(back.display_name(), "run");
        assert_eq!(back.confusion("1"), acc.confusion("1"));
        assert_eq!(back.overall_f1(), acc.overall_f1());
    }
}
