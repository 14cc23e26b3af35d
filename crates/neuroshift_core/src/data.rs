//! Data model: tensors, samples, datasets and predictions.

use crate::error::DataError;
use neuroshift_store::{Entity, FieldValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Dense row-major `f32` tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, DataError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(DataError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element-wise map, keeping the shape.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Prepend a batch dimension of size 1.
    pub fn unsqueeze(&self) -> Self {
        let mut shape = Vec::with_capacity(self.shape.len() + 1);
        shape.push(1);
        shape.extend_from_slice(&self.shape);
        Self {
            shape,
            data: self.data.clone(),
        }
    }

    /// Drop a leading dimension of size 1, if present.
    pub fn squeeze(&self) -> Self {
        match self.shape.split_first() {
            Some((&1, rest)) => Self {
                shape: rest.to_vec(),
                data: self.data.clone(),
            },
            _ => self.clone(),
        }
    }

    /// Stack equally shaped tensors along a new leading dimension.
    pub fn stack(items: &[&Tensor]) -> Result<Self, DataError> {
        let Some(first) = items.first() else {
            return Ok(Self::zeros(vec![0]));
        };
        let mut data = Vec::with_capacity(first.len() * items.len());
        for item in items {
            if item.shape != first.shape {
                return Err(DataError::ShapeMismatch {
                    shape: first.shape.clone(),
                    expected: first.len(),
                    actual: item.len(),
                });
            }
            data.extend_from_slice(&item.data);
        }
        let mut shape = vec![items.len()];
        shape.extend_from_slice(&first.shape);
        Ok(Self { shape, data })
    }
}

/// One labelled input, e.g. an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    label: String,
    path: String,
    actual_class: Option<String>,
    tensor: Tensor,
}

impl Sample {
    pub fn new(
        label: impl Into<String>,
        path: impl Into<String>,
        actual_class: Option<String>,
        tensor: Tensor,
    ) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            actual_class,
            tensor,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn actual_class(&self) -> Option<&str> {
        self.actual_class.as_deref()
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// Same identity, different content.
    pub fn with_tensor(&self, tensor: Tensor) -> Self {
        Self {
            label: self.label.clone(),
            path: self.path.clone(),
            actual_class: self.actual_class.clone(),
            tensor,
        }
    }
}

/// A stacked batch tensor and the samples it was built from.
#[derive(Debug, Clone)]
pub struct Batch {
    pub tensor: Tensor,
    pub samples: Vec<Arc<Sample>>,
}

fn default_batch_size() -> usize {
    32
}

/// Named, ordered collection of equally shaped samples.
///
/// `file_name` is the immutable identity used by the dataset catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    file_name: String,
    name: String,
    description: String,
    classes: Vec<String>,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    samples: Vec<Arc<Sample>>,
}

impl Dataset {
    pub fn new(
        file_name: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        classes: Vec<String>,
        batch_size: usize,
    ) -> Result<Self, DataError> {
        if batch_size == 0 {
            return Err(DataError::ZeroBatchSize);
        }
        Ok(Self {
            file_name: file_name.into(),
            name: name.into(),
            description: description.into(),
            classes,
            batch_size,
            samples: Vec::new(),
        })
    }

    /// Same metadata, no samples.
    pub fn empty_like(&self) -> Self {
        Self {
            file_name: self.file_name.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            classes: self.classes.clone(),
            batch_size: self.batch_size,
            samples: Vec::new(),
        }
    }

    /// Append a sample; its shape must match the first sample's.
    pub fn add_sample(&mut self, sample: Sample) -> Result<(), DataError> {
        if let Some(first) = self.samples.first() {
            if first.tensor().shape() != sample.tensor().shape() {
                return Err(DataError::IncompatibleSample {
                    label: sample.label().to_string(),
                    expected: first.tensor().shape().to_vec(),
                    found: sample.tensor().shape().to_vec(),
                });
            }
        }
        self.samples.push(Arc::new(sample));
        Ok(())
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn samples(&self) -> &[Arc<Sample>] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterate batches in sample order. Restartable: every call starts over.
    pub fn batches(&self) -> impl Iterator<Item = Batch> + '_ {
        self.samples.chunks(self.batch_size.max(1)).map(|chunk| {
            let tensors: Vec<&Tensor> = chunk.iter().map(|s| s.tensor()).collect();
            // Shapes are checked on insertion, so stacking cannot fail.
            let tensor = Tensor::stack(&tensors).unwrap_or_else(|_| Tensor::zeros(vec![0]));
            Batch {
                tensor,
                samples: chunk.to_vec(),
            }
        })
    }
}

impl Entity for Dataset {
    const FIELDS: &'static [&'static str] = &["file_name"];

    fn immutable_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![("file_name", self.file_name.clone().into())]
    }
}

/// What a perturbation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    Dataset,
    ModelParameter,
    ModelActivation,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Dataset => write!(f, "Dataset"),
            Target::ModelParameter => write!(f, "Parameter"),
            Target::ModelActivation => write!(f, "Activation"),
        }
    }
}

/// One classification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    input: Arc<Sample>,
    perturbed: Arc<Sample>,
    predicted_class: String,
    confidence: f32,
}

impl Prediction {
    pub fn new(
        input: Arc<Sample>,
        perturbed: Arc<Sample>,
        predicted_class: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            input,
            perturbed,
            predicted_class: predicted_class.into(),
            confidence,
        }
    }

    pub fn input(&self) -> &Arc<Sample> {
        &self.input
    }

    pub fn perturbed(&self) -> &Arc<Sample> {
        &self.perturbed
    }

    /// Ground truth, taken from the unperturbed input.
    pub fn actual_class(&self) -> Option<&str> {
        self.input.actual_class()
    }

    pub fn predicted_class(&self) -> &str {
        &self.predicted_class
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn is_correct(&self) -> bool {
        self.actual_class() == Some(self.predicted_class.as_str())
    }
}
