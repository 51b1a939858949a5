#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use bpgate_core::{Bpnl, ExternalId, FixedClock, TenantBpnl};
use bpgate_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use bpgate_infra::{InMemoryGateStore, InputRelationUpsert, NewInputRelation, RelationService};
use bpgate_relations::{RelationEvent, RelationType, SharingStateRecord};

pub type Bus = InMemoryEventBus<EventEnvelope<RelationEvent>>;
pub type Service = RelationService<Arc<InMemoryGateStore>, Arc<InMemoryGateStore>, Arc<Bus>>;

pub struct Harness {
    pub store: Arc<InMemoryGateStore>,
    pub bus: Arc<Bus>,
    pub clock: Arc<FixedClock>,
    pub service: Service,
    pub events: Subscription<EventEnvelope<RelationEvent>>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryGateStore::new());
        let bus = Arc::new(Bus::new());
        let clock = Arc::new(FixedClock::new(start()));
        let events = bus.subscribe();
        let service = RelationService::new(store.clone(), store.clone(), bus.clone(), clock.clone());
        Self {
            store,
            bus,
            clock,
            service,
            events,
        }
    }

    /// Register business partners of a tenant in the sharing ledger.
    pub fn partners(&self, tenant: &TenantBpnl, external_ids: &[&str]) {
        for external_id in external_ids {
            self.store
                .insert_sharing_state(SharingStateRecord::new(tenant.clone(), ext(external_id), start()));
        }
    }

    pub fn partner_with_bpnl(&self, tenant: &TenantBpnl, external_id: &str, bpnl: &str) {
        self.store.upsert_sharing_state(
            SharingStateRecord::new(tenant.clone(), ext(external_id), start()).with_bpnl(Bpnl::parse(bpnl).unwrap()),
        );
    }

    pub fn tick(&self) {
        self.clock.advance(Duration::seconds(1));
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        use bpgate_events::Event;
        self.events.drain().iter().map(|e| e.payload().event_type()).collect()
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

pub fn tenant(s: &str) -> TenantBpnl {
    TenantBpnl::parse(s).unwrap()
}

pub fn ext(s: &str) -> ExternalId {
    ExternalId::parse(s).unwrap()
}

pub fn bpnl(s: &str) -> Bpnl {
    Bpnl::parse(s).unwrap()
}

pub fn new_relation(external_id: Option<&str>, relation_type: RelationType, source: &str, target: &str) -> NewInputRelation {
    NewInputRelation {
        external_id: external_id.map(ext),
        relation_type,
        source_external_id: ext(source),
        target_external_id: ext(target),
    }
}

pub fn upsert(external_id: &str, relation_type: RelationType, source: &str, target: &str) -> InputRelationUpsert {
    InputRelationUpsert {
        external_id: ext(external_id),
        relation_type,
        source_external_id: ext(source),
        target_external_id: ext(target),
    }
}
