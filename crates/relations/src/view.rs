//! Read-side shapes of a relation returned by searches and the sharing process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bpgate_core::{Bpnl, ExternalId, TenantBpnl};

use crate::relation::Relation;
use crate::relation_type::RelationType;
use crate::sharing_state::RelationSharingStateType;

/// Input stage as the tenant submitted it, endpoints named by external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRelation {
    pub external_id: ExternalId,
    pub relation_type: RelationType,
    pub source_external_id: ExternalId,
    pub target_external_id: ExternalId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InputRelation {
    /// Build the view from a relation and the external ids its stage endpoints
    /// resolve to. `None` when the relation has no input stage.
    pub fn from_relation(
        relation: &Relation,
        source_external_id: ExternalId,
        target_external_id: ExternalId,
    ) -> Option<Self> {
        let stage = relation.input()?;
        Some(Self {
            external_id: relation.external_id().clone(),
            relation_type: stage.relation_type,
            source_external_id,
            target_external_id,
            created_at: stage.created_at,
            updated_at: stage.updated_at,
        })
    }
}

/// Published relation between two resolved legal entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRelation {
    pub external_id: ExternalId,
    pub relation_type: RelationType,
    pub source_bpnl: Bpnl,
    pub target_bpnl: Bpnl,
    pub updated_at: DateTime<Utc>,
}

impl OutputRelation {
    pub fn from_relation(relation: &Relation) -> Option<Self> {
        let output = relation.output()?;
        Some(Self {
            external_id: relation.external_id().clone(),
            relation_type: output.relation_type,
            source_bpnl: output.source_bpnl.clone(),
            target_bpnl: output.target_bpnl.clone(),
            updated_at: output.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSharingStateView {
    pub external_id: ExternalId,
    pub relation_type: RelationType,
    pub sharing_state_type: RelationSharingStateType,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RelationSharingStateView {
    pub fn from_relation(relation: &Relation) -> Option<Self> {
        let state = relation.sharing_state()?;
        Some(Self {
            external_id: relation.external_id().clone(),
            relation_type: state.relation_type(),
            sharing_state_type: state.state_type(),
            error_message: state.error_message().map(str::to_owned),
            updated_at: state.updated_at(),
        })
    }
}

/// Relation endpoint as handed to the sharing process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerReference {
    pub external_id: ExternalId,
    /// Known once the pool resolved the partner.
    pub bpnl: Option<Bpnl>,
}

/// Work item returned when relations are claimed for sharing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSharingTask {
    pub tenant: TenantBpnl,
    pub external_id: ExternalId,
    pub relation_type: RelationType,
    pub source: PartnerReference,
    pub target: PartnerReference,
}

impl RelationSharingTask {
    /// Both endpoints carry a BPNL, so the relation can be promoted right away.
    pub fn is_resolvable(&self) -> bool {
        self.source.bpnl.is_some() && self.target.bpnl.is_some()
    }
}
