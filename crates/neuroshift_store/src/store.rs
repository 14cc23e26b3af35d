//! Entity Store - indexed records persisted as JSON files
//!
//! Records are held as `Arc<T>` so callers and indices share one instance;
//! identity inside the store is pointer identity.

use crate::entity::{Entity, FieldValue};
use crate::error::{Result, StoreError};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = "json";
const TEMP_PREFIX: &str = ".tmp_";
const NAME_SEPARATOR: &str = " ";

struct Slot<T> {
    value: Arc<T>,
    /// File name the record was first saved or loaded under.
    file_name: Option<String>,
}

/// Indexed collection of entities with one JSON file per persisted record.
pub struct EntityStore<T: Entity> {
    dir: PathBuf,
    file_fields: Vec<&'static str>,
    slots: Vec<Slot<T>>,
    index: HashMap<&'static str, HashMap<FieldValue, Vec<Arc<T>>>>,
}

impl<T: Entity> EntityStore<T> {
    /// Create an empty store rooted at `dir`.
    ///
    /// `file_fields` restricts which immutable fields make up file names;
    /// an empty list uses every declared field.
    pub fn new(dir: impl Into<PathBuf>, file_fields: &[&str]) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in T::FIELDS {
            if !seen.insert(*field) {
                return Err(StoreError::DuplicateField(*field));
            }
        }

        let file_fields = if file_fields.is_empty() {
            T::FIELDS.to_vec()
        } else {
            file_fields
                .iter()
                .map(|name| {
                    T::FIELDS
                        .iter()
                        .find(|declared| *declared == name)
                        .copied()
                        .ok_or_else(|| StoreError::UndeclaredField(name.to_string()))
                })
                .collect::<Result<Vec<_>>>()?
        };

        let index = T::FIELDS
            .iter()
            .map(|field| (*field, HashMap::new()))
            .collect();

        Ok(Self {
            dir: dir.into(),
            file_fields,
            slots: Vec::new(),
            index,
        })
    }

    /// Create an in-memory store from initial values.
    pub fn from_values(
        dir: impl Into<PathBuf>,
        file_fields: &[&str],
        values: impl IntoIterator<Item = T>,
    ) -> Result<Self> {
        let mut store = Self::new(dir, file_fields)?;
        for value in values {
            store.append(Arc::new(value))?;
        }
        Ok(store)
    }

    /// Rebuild a store from every record file in `dir`.
    ///
    /// A missing directory yields an empty store. Every file other than an
    /// interrupted write is read as a record, and any file that fails to
    /// read or parse fails the whole load.
    pub fn load(dir: impl Into<PathBuf>, file_fields: &[&str]) -> Result<Self> {
        let dir = dir.into();
        let mut store = Self::new(dir.clone(), file_fields)?;

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Store directory {} does not exist yet", dir.display());
                return Ok(store);
            }
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let path = entry.path();
            if path.is_dir() || is_temp_file(&path) {
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        for path in paths {
            let json = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            let value: T =
                serde_json::from_str(&json).map_err(|e| StoreError::serialization(&path, e))?;
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string);
            store.insert(Arc::new(value), file_name)?;
        }

        debug!("Loaded {} records from {}", store.len(), dir.display());
        Ok(store)
    }

    /// Like [`EntityStore::load`], but a failed load is logged and yields an
    /// empty store.
    pub fn load_or_empty(dir: impl Into<PathBuf>, file_fields: &[&str]) -> Result<Self> {
        let dir = dir.into();
        match Self::load(dir.clone(), file_fields) {
            Ok(store) => Ok(store),
            Err(e @ (StoreError::Io { .. } | StoreError::Serialization { .. })) => {
                warn!("Discarding store at {}: {}", dir.display(), e);
                Self::new(dir, file_fields)
            }
            Err(e) => Err(e),
        }
    }

    /// Add a value and index it. Returns `false` if it is already present.
    pub fn append(&mut self, value: Arc<T>) -> Result<bool> {
        if self.contains(&value) {
            return Ok(false);
        }
        self.insert(value, None)?;
        Ok(true)
    }

    fn insert(&mut self, value: Arc<T>, file_name: Option<String>) -> Result<()> {
        let fields = checked_fields(value.as_ref())?;
        for (name, field_value) in fields {
            self.index
                .entry(name)
                .or_default()
                .entry(field_value)
                .or_default()
                .push(Arc::clone(&value));
        }
        self.slots.push(Slot { value, file_name });
        Ok(())
    }

    /// All values whose `field` equals `value`, in insertion order.
    ///
    /// Returns an empty list for a field the entity type does not declare.
    pub fn get(&self, field: &str, value: &FieldValue) -> Vec<Arc<T>> {
        self.index
            .get(field)
            .and_then(|by_value| by_value.get(value))
            .cloned()
            .unwrap_or_default()
    }

    /// Whether this exact instance is in the store.
    pub fn contains(&self, value: &Arc<T>) -> bool {
        self.position(value).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every value, in insertion order.
    pub fn items(&self) -> Vec<Arc<T>> {
        self.slots.iter().map(|slot| Arc::clone(&slot.value)).collect()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file backing `value`, once it has been saved.
    pub fn file_path(&self, value: &Arc<T>) -> Option<PathBuf> {
        let idx = self.position(value)?;
        self.slots[idx]
            .file_name
            .as_ref()
            .map(|name| self.dir.join(name))
    }

    /// Remove a value from memory, from every index and from disk.
    ///
    /// Returns `false` if the value is not in the store.
    pub fn delete(&mut self, value: &Arc<T>) -> Result<bool> {
        let Some(idx) = self.position(value) else {
            return Ok(false);
        };
        let slot = self.slots.remove(idx);

        for by_value in self.index.values_mut() {
            by_value.retain(|_, bucket| {
                bucket.retain(|item| !Arc::ptr_eq(item, &slot.value));
                !bucket.is_empty()
            });
        }

        if let Some(file_name) = slot.file_name {
            let path = self.dir.join(file_name);
            match fs::remove_file(&path) {
                Ok(()) => debug!("Deleted record {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
        Ok(true)
    }

    /// Persist one record, appending it first if it is not in the store.
    pub fn save(&mut self, value: &Arc<T>) -> Result<PathBuf> {
        let idx = match self.position(value) {
            Some(idx) => idx,
            None => {
                self.insert(Arc::clone(value), None)?;
                self.slots.len() - 1
            }
        };
        self.write_slot(idx)
    }

    /// Persist every record in the store.
    pub fn save_all(&mut self) -> Result<()> {
        for idx in 0..self.slots.len() {
            self.write_slot(idx)?;
        }
        Ok(())
    }

    fn write_slot(&mut self, idx: usize) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let file_name = match &self.slots[idx].file_name {
            Some(name) => name.clone(),
            None => {
                let name = self.unique_file_name(idx);
                self.slots[idx].file_name = Some(name.clone());
                name
            }
        };

        let path = self.dir.join(&file_name);
        let json = serde_json::to_string_pretty(self.slots[idx].value.as_ref())
            .map_err(|e| StoreError::serialization(&path, e))?;
        atomic_write(&path, json.as_bytes())?;

        debug!("Saved record to {}", path.display());
        Ok(path)
    }

    /// Derive a file name for the record at `idx` that no other record uses.
    fn unique_file_name(&self, idx: usize) -> String {
        let value = &self.slots[idx].value;
        let stem = self
            .file_fields
            .iter()
            .filter_map(|field| value.field(field))
            .map(|v| sanitize_component(&v.to_string()))
            .collect::<Vec<_>>()
            .join(NAME_SEPARATOR);
        let stem = if stem.is_empty() { "record".to_string() } else { stem };

        let taken: HashSet<&str> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .filter_map(|(_, slot)| slot.file_name.as_deref())
            .collect();

        let mut candidate = format!("{}.{}", stem, RECORD_EXTENSION);
        let mut n = 2;
        while taken.contains(candidate.as_str()) || self.dir.join(&candidate).exists() {
            candidate = format!("{} ({}).{}", stem, n, RECORD_EXTENSION);
            n += 1;
        }
        candidate
    }

    fn position(&self, value: &Arc<T>) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| Arc::ptr_eq(&slot.value, value))
    }
}

fn checked_fields<T: Entity>(value: &T) -> Result<Vec<(&'static str, FieldValue)>> {
    let fields = value.immutable_fields();
    let found: Vec<&'static str> = fields.iter().map(|(name, _)| *name).collect();
    if found != T::FIELDS {
        return Err(StoreError::FieldMismatch {
            expected: T::FIELDS.to_vec(),
            found,
        });
    }
    Ok(fields)
}

/// Leftover of an interrupted `atomic_write`.
fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(TEMP_PREFIX))
}

fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Atomic write via temp file + rename
fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = parent.join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4()));
    fs::write(&temp_path, content).map_err(|e| StoreError::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}
