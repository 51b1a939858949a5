//! Relation Store boundary.
//!
//! Persists relations with their input stage, sharing state and output. All writes
//! go through [`RelationStore::commit`], which applies a batch of changes atomically.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryGateStore;
pub use postgres::PostgresGateStore;
pub use r#trait::{RelationChange, RelationStore, StoreError};
