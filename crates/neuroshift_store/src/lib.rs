//! Generic persisted entity store.
//!
//! Every entity type declares a fixed set of immutable identity fields. The
//! store keeps one index per declared field and persists each record as one
//! JSON file:
//!
//! ```text
//! <dir>/
//! ├── <field values>.json
//! ├── <field values> (2).json
//! └── ...
//! ```

pub mod entity;
pub mod error;
pub mod store;

pub use entity::{Entity, FieldValue};
pub use error::{Result, StoreError};
pub use store::EntityStore;
