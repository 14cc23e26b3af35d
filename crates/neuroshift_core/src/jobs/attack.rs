//! Adversarial attack on a single sample.
//!
//! Always produces exactly two predictions: the attacked sample first, then
//! the unattacked preview.

use super::{Job, JobCore, JobResult};
use crate::collaborators::{Attack, Model};
use crate::data::{Prediction, Sample, Tensor};
use crate::error::{CollaboratorError, JobError};
use crate::metrics::{CompositeKey, MetricsAccumulator, MetricsRegistry};
use neuroshift_ids::JobId;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

const ATTACK_PREDICTIONS: usize = 2;

pub struct AttackJob {
    core: JobCore,
    sample: Arc<Sample>,
    model: Arc<dyn Model>,
    attack: Arc<dyn Attack>,
    pacing: Duration,
}

impl AttackJob {
    /// Create the job and register its accumulator in `registry`.
    ///
    /// `pacing` is slept before the final prediction is recorded.
    pub fn new(
        registry: &MetricsRegistry,
        sample: Arc<Sample>,
        model: Arc<dyn Model>,
        attack: Arc<dyn Attack>,
        pacing: Duration,
    ) -> Self {
        let id = JobId::new();
        let key = CompositeKey::new(Some(model.file_name()), None, Some(attack.name()));
        let accumulator = Arc::new(MetricsAccumulator::with_key(
            id.clone(),
            ATTACK_PREDICTIONS,
            key,
            Vec::new(),
        ));
        registry.add(Arc::clone(&accumulator));

        Self {
            core: JobCore::new(id, accumulator),
            sample,
            model,
            attack,
            pacing,
        }
    }

    pub fn accumulator(&self) -> &Arc<MetricsAccumulator> {
        self.core.accumulator()
    }

    fn top_result(&self, batch: &Tensor) -> Result<(String, f32), JobError> {
        self.model
            .infer(batch)?
            .into_iter()
            .next()
            .ok_or(JobError::ResultCount {
                expected: 1,
                actual: 0,
            })
    }

    fn run(&self) -> Result<(), JobError> {
        let input = self.sample.tensor().unsqueeze();
        let attacked_tensor = self.attack.apply(self.model.as_ref(), &input)?;
        if attacked_tensor.len() != input.len() {
            return Err(CollaboratorError::Attack(format!(
                "attack changed input size from {} to {}",
                input.len(),
                attacked_tensor.len()
            ))
            .into());
        }

        let (class, confidence) = self.top_result(&attacked_tensor)?;
        let attacked = Arc::new(self.sample.with_tensor(attacked_tensor.squeeze()));
        let accumulator = self.core.accumulator();
        accumulator.add_prediction(Prediction::new(
            Arc::clone(&attacked),
            Arc::clone(&attacked),
            class,
            confidence,
        ))?;

        let (class, confidence) = self.top_result(&input)?;
        if !self.pacing.is_zero() {
            thread::sleep(self.pacing);
        }
        // The last append completes the accumulator.
        accumulator.add_prediction(Prediction::new(
            Arc::clone(&self.sample),
            attacked,
            class,
            confidence,
        ))?;
        Ok(())
    }
}

impl Job for AttackJob {
    fn id(&self) -> &JobId {
        self.core.id()
    }

    fn execute(&mut self) -> JobResult {
        info!(
            "Attack job {} running {} on '{}'",
            self.core.id(),
            self.attack.name(),
            self.sample.label()
        );
        self.core.run(|| self.run())
    }
}
