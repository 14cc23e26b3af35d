//! Catalogs of the datasets and models a user can pick from.
//!
//! Both catalogs are keyed by file name and keep one entry selected while
//! they are non-empty.

use crate::collaborators::Model;
use crate::data::Dataset;
use crate::error::CatalogError;
use neuroshift_store::{EntityStore, FieldValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const DATASET_KEY: &str = "file_name";

/// Persisted datasets, indexed by their immutable `file_name`.
pub struct DatasetCatalog {
    store: EntityStore<Dataset>,
    selected: Option<String>,
}

impl DatasetCatalog {
    /// Empty catalog persisting to `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        Ok(Self {
            store: EntityStore::new(dir, &[DATASET_KEY])?,
            selected: None,
        })
    }

    /// Catalog preloaded from `dir`; the first dataset is selected.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let store: EntityStore<Dataset> = EntityStore::load_or_empty(dir, &[DATASET_KEY])?;
        let selected = store.items().first().map(|d| d.file_name().to_string());
        info!("Loaded {} dataset(s) from {}", store.len(), store.dir().display());
        Ok(Self { store, selected })
    }

    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// Add a dataset. The first dataset added becomes the selection.
    pub fn add(&mut self, dataset: Dataset) -> Result<Arc<Dataset>, CatalogError> {
        if self.get(dataset.file_name()).is_some() {
            return Err(CatalogError::Duplicate(dataset.file_name().to_string()));
        }
        let dataset = Arc::new(dataset);
        self.store.append(Arc::clone(&dataset))?;
        if self.selected.is_none() {
            self.selected = Some(dataset.file_name().to_string());
        }
        debug!("Added dataset {}", dataset.file_name());
        Ok(dataset)
    }

    pub fn get(&self, file_name: &str) -> Option<Arc<Dataset>> {
        self.store
            .get(DATASET_KEY, &FieldValue::from(file_name))
            .into_iter()
            .next()
    }

    /// File names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.store
            .items()
            .iter()
            .map(|d| d.file_name().to_string())
            .collect()
    }

    pub fn datasets(&self) -> Vec<Arc<Dataset>> {
        self.store.items()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn select(&mut self, file_name: &str) -> Result<Arc<Dataset>, CatalogError> {
        let dataset = self
            .get(file_name)
            .ok_or_else(|| CatalogError::NotFound(file_name.to_string()))?;
        self.selected = Some(file_name.to_string());
        Ok(dataset)
    }

    pub fn selected(&self) -> Option<Arc<Dataset>> {
        self.selected.as_deref().and_then(|name| self.get(name))
    }

    /// Remove a dataset and its file. Deleting the selection selects the
    /// first remaining dataset.
    pub fn delete(&mut self, file_name: &str) -> Result<bool, CatalogError> {
        let Some(dataset) = self.get(file_name) else {
            return Ok(false);
        };
        self.store.delete(&dataset)?;
        if self.selected.as_deref() == Some(file_name) {
            self.selected = self
                .store
                .items()
                .first()
                .map(|d| d.file_name().to_string());
        }
        info!("Deleted dataset {}", file_name);
        Ok(true)
    }

    /// Persist one dataset, returning the file written.
    pub fn save(&mut self, file_name: &str) -> Result<PathBuf, CatalogError> {
        let dataset = self
            .get(file_name)
            .ok_or_else(|| CatalogError::NotFound(file_name.to_string()))?;
        Ok(self.store.save(&dataset)?)
    }

    pub fn save_all(&mut self) -> Result<(), CatalogError> {
        Ok(self.store.save_all()?)
    }
}

/// In-memory list of loaded models.
#[derive(Default)]
pub struct ModelCatalog {
    models: Vec<Arc<dyn Model>>,
    selected: Option<usize>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, file_name: &str) -> Option<usize> {
        self.models.iter().position(|m| m.file_name() == file_name)
    }

    /// Add a model. The first model added becomes the selection.
    pub fn add(&mut self, model: Arc<dyn Model>) -> Result<(), CatalogError> {
        if self.position(model.file_name()).is_some() {
            return Err(CatalogError::Duplicate(model.file_name().to_string()));
        }
        debug!("Added model {}", model.file_name());
        self.models.push(model);
        if self.selected.is_none() {
            self.selected = Some(0);
        }
        Ok(())
    }

    pub fn get(&self, file_name: &str) -> Option<Arc<dyn Model>> {
        self.position(file_name).map(|i| Arc::clone(&self.models[i]))
    }

    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.file_name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn select(&mut self, file_name: &str) -> Result<Arc<dyn Model>, CatalogError> {
        let index = self
            .position(file_name)
            .ok_or_else(|| CatalogError::NotFound(file_name.to_string()))?;
        self.selected = Some(index);
        Ok(Arc::clone(&self.models[index]))
    }

    pub fn selected(&self) -> Option<Arc<dyn Model>> {
        self.selected
            .and_then(|i| self.models.get(i))
            .map(Arc::clone)
    }

    /// Remove a model. The last remaining model cannot be deleted.
    pub fn delete(&mut self, file_name: &str) -> Result<bool, CatalogError> {
        let Some(index) = self.position(file_name) else {
            return Ok(false);
        };
        if self.models.len() == 1 {
            return Err(CatalogError::LastModel);
        }
        self.models.remove(index);
        self.selected = match self.selected {
            Some(s) if s == index => Some(0),
            Some(s) if s > index => Some(s - 1),
            other => other,
        };
        info!("Deleted model {}", file_name);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Perturbation;
    use crate::data::{Sample, Tensor};
    use crate::error::CollaboratorError;
    use crate::jobs::fakes::digits;
    use tempfile::TempDir;

    fn named(file_name: &str) -> Dataset {
        let mut dataset = Dataset::new(file_name, file_name, "", vec!["a".to_string()], 4).unwrap();
        dataset
            .add_sample(Sample::new(
                "s0",
                "/s0.png",
                Some("a".to_string()),
                Tensor::new(vec![2], vec![0.0, 1.0]).unwrap(),
            ))
            .unwrap();
        dataset
    }

    struct Stub(&'static str);

    impl Model for Stub {
        fn name(&self) -> &str {
            self.0
        }

        fn file_name(&self) -> &str {
            self.0
        }

        fn infer(&self, _batch: &Tensor) -> Result<Vec<(String, f32)>, CollaboratorError> {
            Ok(Vec::new())
        }

        fn try_clone(&self) -> Result<Box<dyn Model>, CollaboratorError> {
            Ok(Box::new(Stub(self.0)))
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

    #[test]
    fn test_dataset_add_rejects_duplicates() {
        let temp = TempDir::new().unwrap();
        let mut catalog = DatasetCatalog::new(temp.path()).unwrap();

        catalog.add(digits(3, 2)).unwrap();
        let err = catalog.add(digits(1, 1)).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate(name) if name == "digits.zip"));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("digits.zip").unwrap().len(), 3);
    }

    #[test]
    fn test_dataset_selection_follows_deletes() {
        let temp = TempDir::new().unwrap();
        let mut catalog = DatasetCatalog::new(temp.path()).unwrap();
        catalog.add(named("a.zip")).unwrap();
        catalog.add(named("b.zip")).unwrap();
        catalog.add(named("c.zip")).unwrap();
        assert_eq!(catalog.selected().unwrap().file_name(), "a.zip");

        catalog.select("c.zip").unwrap();
        assert!(catalog.delete("c.zip").unwrap());
        assert_eq!(catalog.selected().unwrap().file_name(), "a.zip");
        assert_eq!(catalog.names(), vec!["a.zip", "b.zip"]);

        assert!(!catalog.delete("c.zip").unwrap());
        assert!(matches!(catalog.select("c.zip"), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_dataset_save_and_load() {
        let temp = TempDir::new().unwrap();
        {
            let mut catalog = DatasetCatalog::new(temp.path()).unwrap();
            catalog.add(digits(4, 2)).unwrap();
            catalog.add(named("b.zip")).unwrap();
            let path = catalog.save("digits.zip").unwrap();
            assert!(path.exists());
            catalog.save_all().unwrap();
        }

        let catalog = DatasetCatalog::load(temp.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        let digits = catalog.get("digits.zip").unwrap();
        assert_eq!(digits.len(), 4);
        assert_eq!(digits.samples()[1].actual_class(), Some("1"));
        assert!(catalog.selected().is_some());
    }

    #[test]
    fn test_dataset_delete_removes_file() {
        let temp = TempDir::new().unwrap();
        let mut catalog = DatasetCatalog::new(temp.path()).unwrap();
        catalog.add(named("a.zip")).unwrap();
        let path = catalog.save("a.zip").unwrap();

        catalog.delete("a.zip").unwrap();
        assert!(!path.exists());
        assert!(catalog.selected().is_none());
    }

    #[test]
    fn test_model_catalog_refuses_last_delete() {
        let mut catalog = ModelCatalog::new();
        catalog.add(Arc::new(Stub("lenet.onnx"))).unwrap();
        catalog.add(Arc::new(Stub("resnet.onnx"))).unwrap();
        assert!(matches!(
            catalog.add(Arc::new(Stub("lenet.onnx"))),
            Err(CatalogError::Duplicate(_))
        ));
        assert_eq!(catalog.selected().unwrap().file_name(), "lenet.onnx");

        catalog.select("resnet.onnx").unwrap();
        assert!(catalog.delete("lenet.onnx").unwrap());
        assert_eq!(catalog.selected().unwrap().file_name(), "resnet.onnx");

        assert!(matches!(catalog.delete("resnet.onnx"), Err(CatalogError::LastModel)));
        assert_eq!(catalog.names(), vec!["resnet.onnx"]);
    }

    #[test]
    fn test_model_delete_of_selection_selects_first() {
        let mut catalog = ModelCatalog::new();
        for name in ["a.onnx", "b.onnx", "c.onnx"] {
            catalog.add(Arc::new(Stub(name))).unwrap();
        }
        catalog.select("b.onnx").unwrap();
        catalog.delete("b.onnx").unwrap();
        assert_eq!(catalog.selected().unwrap().file_name(), "a.onnx");
    }
}
