//! Boundaries to the model runtime, perturbation algorithms and attacks.
//!
//! The core never looks inside these; it only calls them from job workers.

use crate::data::{Target, Tensor};
use crate::error::CollaboratorError;
use std::sync::Arc;

/// A classifier.
pub trait Model: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Stable identity, used in composite keys.
    fn file_name(&self) -> &str;

    /// Classify every item of a batch, returning `(class, confidence)` per item
    /// in batch order.
    fn infer(&self, batch: &Tensor) -> Result<Vec<(String, f32)>, CollaboratorError>;

    /// Independent deep copy, so perturbing the copy leaves `self` untouched.
    fn try_clone(&self) -> Result<Box<dyn Model>, CollaboratorError>;

    /// Every trainable parameter tensor.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    /// Wrap every activation-producing sub-module so its output passes through
    /// `perturbation` before reaching the next layer.
    fn wrap_activations(
        &mut self,
        perturbation: Arc<dyn Perturbation>,
    ) -> Result<(), CollaboratorError>;
}

/// A configured, deterministic `tensor -> tensor` transform.
pub trait Perturbation: Send + Sync {
    fn name(&self) -> &str;

    fn target(&self) -> Target;

    fn apply(&self, tensor: &Tensor) -> Result<Tensor, CollaboratorError>;
}

/// An adversarial attack crafting an input against a specific model.
pub trait Attack: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the attacked version of `input` (batch of one).
    fn apply(&self, model: &dyn Model, input: &Tensor) -> Result<Tensor, CollaboratorError>;
}
