use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bpgate_core::{RelationId, TenantBpnl};

/// Envelope for an event, containing tenant + aggregate metadata.
///
/// This is the unit published on the bus after a relation change was committed.
/// `sequence_number` is the aggregate version reached by applying `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant: TenantBpnl,

    aggregate_id: RelationId,
    aggregate_type: String,

    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        tenant: TenantBpnl,
        aggregate_id: RelationId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            tenant,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant(&self) -> &TenantBpnl {
        &self.tenant
    }

    pub fn aggregate_id(&self) -> RelationId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
