//! Metrics Registry - live and saved accumulators
//!
//! Every job registers its accumulator here at construction. A subset is
//! "saved" (persisted under the analytics directory), and at most one
//! accumulator is the reference other runs are compared against.
//!
//! Misuse (saving twice, unknown ids) is reported through return values.

use super::accumulator::{CompositeKey, MetricsAccumulator};
use neuroshift_ids::JobId;
use neuroshift_store::{EntityStore, StoreError};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

struct RegistryState {
    live: EntityStore<MetricsAccumulator>,
    /// Order is not stable across deletions.
    saved: Vec<Arc<MetricsAccumulator>>,
    reference: Option<Arc<MetricsAccumulator>>,
}

impl RegistryState {
    fn by_id(&self, id: &JobId) -> Option<Arc<MetricsAccumulator>> {
        let mut matches = self.live.get("job_id", &id.as_str().into());
        if matches.len() == 1 {
            matches.pop()
        } else {
            None
        }
    }

    fn is_saved(&self, accumulator: &Arc<MetricsAccumulator>) -> bool {
        self.saved.iter().any(|a| Arc::ptr_eq(a, accumulator))
    }

    fn persist_if_saved(&mut self, accumulator: &Arc<MetricsAccumulator>) {
        if !self.is_saved(accumulator) {
            return;
        }
        if let Err(e) = self.live.save(accumulator) {
            warn!("Failed to persist analytic {}: {}", accumulator.job_id(), e);
        }
    }
}

/// Thread-safe collection of all [`MetricsAccumulator`]s.
pub struct MetricsRegistry {
    state: Mutex<RegistryState>,
}

impl MetricsRegistry {
    /// Empty registry persisting to `dir`.
    pub fn new(dir: impl Into<PathBuf>, file_fields: &[&str]) -> Result<Self, StoreError> {
        Ok(Self::from_store(EntityStore::new(dir, file_fields)?))
    }

    /// Registry preloaded from `dir`.
    ///
    /// Every loaded record is both live and saved. A corrupt directory is
    /// logged and treated as empty.
    pub fn open(dir: impl Into<PathBuf>, file_fields: &[&str]) -> Result<Self, StoreError> {
        let dir = dir.into();
        let store = EntityStore::load_or_empty(dir.clone(), file_fields)?;
        info!("Loaded {} saved analytics from {}", store.len(), dir.display());
        Ok(Self::from_store(store))
    }

    fn from_store(live: EntityStore<MetricsAccumulator>) -> Self {
        let saved = live.items();
        let mut reference: Option<Arc<MetricsAccumulator>> = None;
        for accumulator in &saved {
            if !accumulator.is_reference() {
                continue;
            }
            if reference.is_some() {
                // Only one reference survives a load.
                accumulator.set_reference_flag(false);
            } else {
                reference = Some(Arc::clone(accumulator));
            }
        }
        Self {
            state: Mutex::new(RegistryState {
                live,
                saved,
                reference,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dir(&self) -> PathBuf {
        self.lock().live.dir().to_path_buf()
    }

    /// Register a live accumulator. Returns `false` if it is already present.
    pub fn add(&self, accumulator: Arc<MetricsAccumulator>) -> bool {
        let job_id = accumulator.job_id().clone();
        match self.lock().live.append(accumulator) {
            Ok(inserted) => {
                debug!("Registered analytic for job {}", job_id);
                inserted
            }
            Err(e) => {
                error!("Failed to register analytic for job {}: {}", job_id, e);
                false
            }
        }
    }

    /// The accumulator of a job, if exactly one is registered under `id`.
    pub fn get_by_id(&self, id: &JobId) -> Option<Arc<MetricsAccumulator>> {
        self.lock().by_id(id)
    }

    /// Every accumulator sharing a composite key, in registration order.
    pub fn get_by_composite_key(&self, key: &CompositeKey) -> Vec<Arc<MetricsAccumulator>> {
        self.lock().live.get("key", &key.as_str().into())
    }

    /// Lookup by the names that make up a composite key.
    pub fn find(
        &self,
        model: Option<&str>,
        dataset: Option<&str>,
        perturbation: Option<&str>,
    ) -> Vec<Arc<MetricsAccumulator>> {
        self.get_by_composite_key(&CompositeKey::new(model, dataset, perturbation))
    }

    /// Every live accumulator, in registration order.
    pub fn live(&self) -> Vec<Arc<MetricsAccumulator>> {
        self.lock().live.items()
    }

    pub fn saved(&self) -> Vec<Arc<MetricsAccumulator>> {
        self.lock().saved.clone()
    }

    pub fn is_saved(&self, accumulator: &Arc<MetricsAccumulator>) -> bool {
        self.lock().is_saved(accumulator)
    }

    /// Name, describe and persist an accumulator.
    ///
    /// Returns `Ok(false)` without touching anything if it is already saved.
    pub fn save(
        &self,
        accumulator: &Arc<MetricsAccumulator>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        if state.is_saved(accumulator) {
            return Ok(false);
        }
        accumulator.set_display_name(name);
        accumulator.set_description(description);

        let path = state.live.save(accumulator)?;
        state.saved.push(Arc::clone(accumulator));
        info!(
            "Saved analytic {} to {}",
            accumulator.job_id(),
            path.display()
        );
        Ok(true)
    }

    /// Persist every live accumulator and mark all of them saved.
    pub fn save_all(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.live.save_all()?;
        for accumulator in state.live.items() {
            if !state.is_saved(&accumulator) {
                state.saved.push(accumulator);
            }
        }
        Ok(())
    }

    /// Make the accumulator of job `id` the reference.
    ///
    /// Returns `false` (and changes nothing) if no such job is registered.
    pub fn set_reference(&self, id: &JobId) -> bool {
        let mut state = self.lock();
        let Some(accumulator) = state.by_id(id) else {
            debug!("Ignoring reference request for unknown job {}", id);
            return false;
        };

        if let Some(previous) = state.reference.take() {
            previous.set_reference_flag(false);
            if !Arc::ptr_eq(&previous, &accumulator) {
                state.persist_if_saved(&previous);
            }
        }
        accumulator.set_reference_flag(true);
        state.persist_if_saved(&accumulator);
        state.reference = Some(accumulator);
        true
    }

    /// Clear the reference, if any.
    pub fn forget_reference(&self) {
        let mut state = self.lock();
        if let Some(previous) = state.reference.take() {
            previous.set_reference_flag(false);
            state.persist_if_saved(&previous);
        }
    }

    pub fn reference(&self) -> Option<Arc<MetricsAccumulator>> {
        self.lock().reference.clone()
    }

    /// Remove an accumulator from the live set, the saved list and disk.
    ///
    /// Returns `false` if it was not registered anywhere.
    pub fn delete(&self, accumulator: &Arc<MetricsAccumulator>) -> Result<bool, StoreError> {
        let mut state = self.lock();

        if state
            .reference
            .as_ref()
            .is_some_and(|r| Arc::ptr_eq(r, accumulator))
        {
            state.reference = None;
            accumulator.set_reference_flag(false);
        }

        let was_live = state.live.delete(accumulator)?;

        let mut was_saved = false;
        if let Some(idx) = state.saved.iter().position(|a| Arc::ptr_eq(a, accumulator)) {
            state.saved.swap_remove(idx);
            was_saved = true;
        }

        if was_live || was_saved {
            info!("Deleted analytic {}", accumulator.job_id());
        }
        Ok(was_live || was_saved)
    }

    /// [`MetricsRegistry::delete`] by job id.
    pub fn delete_by_id(&self, id: &JobId) -> Result<bool, StoreError> {
        match self.get_by_id(id) {
            Some(accumulator) => self.delete(&accumulator),
            None => Ok(false),
        }
    }

    /// Path of the persisted record of a saved accumulator.
    pub fn record_path(&self, accumulator: &Arc<MetricsAccumulator>) -> Option<PathBuf> {
        self.lock().live.file_path(accumulator)
    }
}
