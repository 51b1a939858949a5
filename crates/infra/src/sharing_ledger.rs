//! Sharing Ledger lookup.
//!
//! The ledger is owned by the business partner side of the gate; relations only
//! read it to resolve a tenant's partner external id into the sharing-state record
//! the stage will reference.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use bpgate_core::{ExternalId, SharingStateId, TenantBpnl};
use bpgate_relations::SharingStateRecord;

use crate::relation_store::StoreError;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// More than one record for one `(tenant, external id)` pair. This is a data
    /// integrity fault, never a "not found".
    #[error("{count} sharing states found for business partner '{external_id}' of tenant '{tenant}'")]
    Ambiguous {
        tenant: TenantBpnl,
        external_id: ExternalId,
        count: usize,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read access to business partner sharing states.
#[async_trait]
pub trait SharingLedger: Send + Sync {
    /// Every record stored for the pair. Correct data yields zero or one.
    async fn find_partner_records(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Vec<SharingStateRecord>, StoreError>;

    /// Records by id, in no particular order. Unknown ids are skipped.
    async fn find_partner_records_by_ids(&self, ids: &[SharingStateId]) -> Result<Vec<SharingStateRecord>, StoreError>;

    /// Resolve a partner reference to at most one record.
    async fn lookup(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Option<SharingStateRecord>, LedgerError> {
        let mut records = self.find_partner_records(tenant, external_id).await?;
        match records.len() {
            0 => Ok(None),
            1 => Ok(records.pop()),
            count => {
                tracing::error!(
                    tenant = %tenant,
                    external_id = %external_id,
                    count,
                    "ambiguous sharing ledger entry"
                );
                Err(LedgerError::Ambiguous {
                    tenant: tenant.clone(),
                    external_id: external_id.clone(),
                    count,
                })
            }
        }
    }
}

#[async_trait]
impl<L> SharingLedger for Arc<L>
where
    L: SharingLedger + ?Sized,
{
    async fn find_partner_records(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Vec<SharingStateRecord>, StoreError> {
        (**self).find_partner_records(tenant, external_id).await
    }

    async fn find_partner_records_by_ids(&self, ids: &[SharingStateId]) -> Result<Vec<SharingStateRecord>, StoreError> {
        (**self).find_partner_records_by_ids(ids).await
    }

    async fn lookup(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Option<SharingStateRecord>, LedgerError> {
        (**self).lookup(tenant, external_id).await
    }
}
