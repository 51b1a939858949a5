//! Business partner side of the Sharing Ledger, as seen by the relation domain.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bpgate_core::{Bpnl, DomainError, ExternalId, SharingStateId, TenantBpnl};

/// Sharing lifecycle of a business partner (not of a relation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SharingStateType {
    Initial,
    Ready,
    Pending,
    Success,
    Error,
}

impl SharingStateType {
    pub const ALL: [SharingStateType; 5] = [
        SharingStateType::Initial,
        SharingStateType::Ready,
        SharingStateType::Pending,
        SharingStateType::Success,
        SharingStateType::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SharingStateType::Initial => "Initial",
            SharingStateType::Ready => "Ready",
            SharingStateType::Pending => "Pending",
            SharingStateType::Success => "Success",
            SharingStateType::Error => "Error",
        }
    }
}

impl FromStr for SharingStateType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SharingStateType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown sharing state type '{s}'")))
    }
}

/// Sharing Ledger entry for one business partner of one tenant.
///
/// Keyed by `(tenant, external_id)`; `bpnl` is present once the pool assigned the
/// partner a stable identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingStateRecord {
    pub id: SharingStateId,
    pub tenant: TenantBpnl,
    pub external_id: ExternalId,
    pub sharing_state_type: SharingStateType,
    pub bpnl: Option<Bpnl>,
    pub updated_at: DateTime<Utc>,
}

impl SharingStateRecord {
    pub fn new(tenant: TenantBpnl, external_id: ExternalId, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: SharingStateId::new(),
            tenant,
            external_id,
            sharing_state_type: SharingStateType::Initial,
            bpnl: None,
            updated_at,
        }
    }

    pub fn with_bpnl(mut self, bpnl: Bpnl) -> Self {
        self.bpnl = Some(bpnl);
        self.sharing_state_type = SharingStateType::Success;
        self
    }

    pub fn resolved(&self) -> ResolvedPartner {
        ResolvedPartner {
            id: self.id,
            external_id: self.external_id.clone(),
        }
    }
}

/// A relation endpoint after resolution through the Sharing Ledger.
///
/// `id` is the foreign key stored on the stage; `external_id` is carried along so
/// events and responses can name the partner without another lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPartner {
    pub id: SharingStateId,
    pub external_id: ExternalId,
}
