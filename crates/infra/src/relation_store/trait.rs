use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use bpgate_core::{AggregateRoot, ExpectedVersion, ExternalId, Page, PageRequest, RelationId, TenantBpnl};
use bpgate_relations::{
    InputRelation, InputRelationFilter, OutputRelation, OutputRelationFilter, Relation, RelationSharingStateType,
    RelationSharingStateView, RelationStage, SharingStateFilter, StageType,
};

/// Relation store operation error.
///
/// These are infrastructure errors (storage, concurrency) as opposed to domain
/// errors (validation, state transitions).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `(tenant, external id)` uniqueness constraint rejected an insert.
    #[error("relation '{external_id}' already exists for tenant '{tenant}'")]
    DuplicateExternalId { tenant: TenantBpnl, external_id: ExternalId },

    /// Optimistic concurrency check failed (the relation changed or vanished).
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A stored row could not be mapped back into the domain.
    #[error("corrupt relation data: {0}")]
    Corrupt(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// One write of a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationChange {
    /// A new relation with its input stage. Fails on a duplicate `(tenant, external id)`.
    Insert(Relation),
    /// Replace relation, stage, sharing state and output.
    Update {
        relation: Relation,
        expected_version: ExpectedVersion,
    },
    /// Remove the relation and its stages together.
    Delete {
        relation_id: RelationId,
        expected_version: ExpectedVersion,
    },
}

impl RelationChange {
    pub fn relation_id(&self) -> RelationId {
        match self {
            RelationChange::Insert(relation) => *relation.id(),
            RelationChange::Update { relation, .. } => *relation.id(),
            RelationChange::Delete { relation_id, .. } => *relation_id,
        }
    }
}

/// Tenant-scoped persistence of relations.
///
/// Implementations must:
/// - enforce uniqueness of `(tenant, external id)` on insert
/// - check `expected_version` on update and delete
/// - apply a whole `commit` batch or nothing
/// - never leave a stage without its relation
#[async_trait]
pub trait RelationStore: Send + Sync {
    async fn find_by_external_id(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Option<Relation>, StoreError>;

    async fn find_stage(&self, relation_id: RelationId, stage: StageType) -> Result<Option<RelationStage>, StoreError>;

    /// Relations of any tenant in the given sharing state, oldest state change first.
    async fn find_by_sharing_state(
        &self,
        state: RelationSharingStateType,
        limit: usize,
    ) -> Result<Vec<Relation>, StoreError>;

    async fn commit(&self, changes: Vec<RelationChange>) -> Result<(), StoreError>;

    /// Input stages ordered by `(created_at, relation id)`.
    async fn search_input(
        &self,
        tenant: &TenantBpnl,
        filter: &InputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<InputRelation>, StoreError>;

    /// Published outputs ordered by `(created_at, relation id)`.
    async fn search_output(
        &self,
        tenant: &TenantBpnl,
        filter: &OutputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<OutputRelation>, StoreError>;

    async fn search_sharing_states(
        &self,
        tenant: &TenantBpnl,
        filter: &SharingStateFilter,
        page: PageRequest,
    ) -> Result<Page<RelationSharingStateView>, StoreError>;
}

#[async_trait]
impl<S> RelationStore for Arc<S>
where
    S: RelationStore + ?Sized,
{
    async fn find_by_external_id(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Option<Relation>, StoreError> {
        (**self).find_by_external_id(tenant, external_id).await
    }

    async fn find_stage(&self, relation_id: RelationId, stage: StageType) -> Result<Option<RelationStage>, StoreError> {
        (**self).find_stage(relation_id, stage).await
    }

    async fn find_by_sharing_state(
        &self,
        state: RelationSharingStateType,
        limit: usize,
    ) -> Result<Vec<Relation>, StoreError> {
        (**self).find_by_sharing_state(state, limit).await
    }

    async fn commit(&self, changes: Vec<RelationChange>) -> Result<(), StoreError> {
        (**self).commit(changes).await
    }

    async fn search_input(
        &self,
        tenant: &TenantBpnl,
        filter: &InputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<InputRelation>, StoreError> {
        (**self).search_input(tenant, filter, page).await
    }

    async fn search_output(
        &self,
        tenant: &TenantBpnl,
        filter: &OutputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<OutputRelation>, StoreError> {
        (**self).search_output(tenant, filter, page).await
    }

    async fn search_sharing_states(
        &self,
        tenant: &TenantBpnl,
        filter: &SharingStateFilter,
        page: PageRequest,
    ) -> Result<Page<RelationSharingStateView>, StoreError> {
        (**self).search_sharing_states(tenant, filter, page).await
    }
}
