//! Error surface of the reconciliation engine.

use thiserror::Error;

use bpgate_core::{DomainError, ExternalId};

use crate::relation_store::StoreError;
use crate::sharing_ledger::LedgerError;

/// Semantic failure of a relation operation.
///
/// Every variant aborts the operation it was raised in, including the rest of a
/// batch: nothing of a failed call is committed.
#[derive(Debug, Error)]
pub enum RelationError {
    /// A relation with this external id already exists for the tenant.
    #[error("relation '{external_id}' already exists")]
    AlreadyExists { external_id: ExternalId },

    /// The relation (or its input stage) does not exist.
    #[error("relation '{external_id}' not found")]
    NotFound { external_id: ExternalId },

    /// The source partner is unknown to the Sharing Ledger.
    #[error("source business partner '{external_id}' not found")]
    SourceNotFound { external_id: ExternalId },

    /// The target partner is unknown to the Sharing Ledger.
    #[error("target business partner '{external_id}' not found")]
    TargetNotFound { external_id: ExternalId },

    /// The relation itself is invalid (e.g. a partner related to itself).
    #[error("invalid relation: {0}")]
    InvalidRelation(String),

    /// The Sharing Ledger holds more than one record for a partner reference.
    #[error("business partner '{external_id}' is ambiguous ({count} sharing states)")]
    AmbiguousReference { external_id: ExternalId, count: usize },

    /// The sharing state machine rejected the requested transition.
    #[error("invalid sharing state transition: {0}")]
    InvalidTransition(String),

    /// Another writer changed the relation concurrently.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    /// The change was committed but publishing it failed (safe to republish).
    #[error("relation change publication failed: {0}")]
    Publish(String),

    #[error(transparent)]
    Store(StoreError),
}

impl RelationError {
    /// Map an aggregate failure onto the engine's error kinds.
    pub fn from_domain(err: DomainError, external_id: &ExternalId) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => RelationError::InvalidRelation(msg),
            DomainError::NotFound => RelationError::NotFound {
                external_id: external_id.clone(),
            },
            DomainError::Conflict(msg) => RelationError::InvalidTransition(msg),
            DomainError::InvariantViolation(msg) => {
                RelationError::Store(StoreError::Corrupt(format!("relation '{external_id}': {msg}")))
            }
        }
    }
}

impl From<StoreError> for RelationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateExternalId { external_id, .. } => RelationError::AlreadyExists { external_id },
            StoreError::Concurrency(msg) => RelationError::Conflict(msg),
            other => RelationError::Store(other),
        }
    }
}

impl From<LedgerError> for RelationError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Ambiguous { external_id, count, .. } => {
                RelationError::AmbiguousReference { external_id, count }
            }
            LedgerError::Store(err) => RelationError::from(err),
        }
    }
}
