use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bpgate_core::{Bpnl, ValueObject};

use crate::relation_type::RelationType;

/// Published snapshot of a relation once both endpoints have BPNLs.
///
/// Only ever written by the promotion path, never by a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationOutput {
    pub relation_type: RelationType,
    pub source_bpnl: Bpnl,
    pub target_bpnl: Bpnl,
    pub updated_at: DateTime<Utc>,
}

impl ValueObject for RelationOutput {}
