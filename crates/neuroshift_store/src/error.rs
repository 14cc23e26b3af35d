//! Error types for the entity store.

use std::path::PathBuf;
use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Entity store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error on a record file or the store directory
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded
    #[error("Serialization error at {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A file-name field that the entity type does not declare
    #[error("Field '{0}' is not a declared immutable field")]
    UndeclaredField(String),

    /// A value reported fields that differ from its type's declaration
    #[error("Record reports fields {found:?}, type declares {expected:?}")]
    FieldMismatch {
        expected: Vec<&'static str>,
        found: Vec<&'static str>,
    },

    /// The entity type declares the same field twice
    #[error("Immutable field '{0}' is declared more than once")]
    DuplicateField(&'static str),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serialization(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.into(),
            source,
        }
    }
}
