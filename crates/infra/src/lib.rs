//! Infrastructure layer: sharing ledger lookup, relation stores, the relation
//! reconciliation engine, configuration and backend wiring.

pub mod config;
pub mod error;
pub mod relation_service;
pub mod relation_store;
pub mod services;
pub mod sharing_ledger;
pub mod unit_of_work;

pub use config::{ConfigError, GateConfig};
pub use error::RelationError;
pub use relation_service::{
    InputRelationUpsert, NewInputRelation, OutputRelationUpsert, RelationService, RelationServiceSettings,
    SharingErrorReport,
};
pub use relation_store::{InMemoryGateStore, PostgresGateStore, RelationChange, RelationStore, StoreError};
pub use services::GateServices;
pub use sharing_ledger::{LedgerError, SharingLedger};
pub use unit_of_work::UnitOfWork;
