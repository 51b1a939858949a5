//! Inbound request records of the reconciliation engine.

use serde::{Deserialize, Serialize};

use bpgate_core::{Bpnl, ExternalId, TenantBpnl};
use bpgate_relations::RelationType;

/// A tenant's new input relation. A missing external id is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInputRelation {
    #[serde(default)]
    pub external_id: Option<ExternalId>,
    pub relation_type: RelationType,
    pub source_external_id: ExternalId,
    pub target_external_id: ExternalId,
}

/// Input relation addressed by its external id (update and upsert).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRelationUpsert {
    pub external_id: ExternalId,
    pub relation_type: RelationType,
    pub source_external_id: ExternalId,
    pub target_external_id: ExternalId,
}

/// Promotion of a relation once both endpoints have a BPNL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRelationUpsert {
    pub tenant: TenantBpnl,
    pub external_id: ExternalId,
    pub relation_type: RelationType,
    pub source_bpnl: Bpnl,
    pub target_bpnl: Bpnl,
}

/// Downstream failure reported for one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingErrorReport {
    pub tenant: TenantBpnl,
    pub external_id: ExternalId,
    pub message: String,
}
