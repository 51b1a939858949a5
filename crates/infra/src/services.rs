//! Backend selection and wiring.
//!
//! `GateServices` owns one fully wired [`RelationService`] over either the
//! in-memory backend (dev/test) or Postgres, chosen by [`GateConfig`].

use std::sync::Arc;

use bpgate_core::{Clock, ExternalId, Page, PageRequest, SystemClock, TenantBpnl};
use bpgate_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use bpgate_relations::{
    InputRelation, InputRelationFilter, OutputRelation, OutputRelationFilter, Relation, RelationEvent,
    RelationSharingStateView, RelationSharingTask, SharingStateFilter,
};

use crate::config::GateConfig;
use crate::error::RelationError;
use crate::relation_service::{
    InputRelationUpsert, NewInputRelation, OutputRelationUpsert, RelationService, RelationServiceSettings,
    SharingErrorReport,
};
use crate::relation_store::{InMemoryGateStore, PostgresGateStore, StoreError};

pub type RelationBus = InMemoryEventBus<EventEnvelope<RelationEvent>>;

pub type InMemoryRelationService = RelationService<Arc<InMemoryGateStore>, Arc<InMemoryGateStore>, Arc<RelationBus>>;

pub type PostgresRelationService =
    RelationService<Arc<PostgresGateStore>, Arc<PostgresGateStore>, Arc<RelationBus>>;

#[derive(Clone)]
pub enum GateServices {
    InMemory {
        store: Arc<InMemoryGateStore>,
        bus: Arc<RelationBus>,
        service: Arc<InMemoryRelationService>,
    },
    Postgres {
        store: Arc<PostgresGateStore>,
        bus: Arc<RelationBus>,
        service: Arc<PostgresRelationService>,
    },
}

macro_rules! dispatch {
    ($self:ident, $service:ident => $call:expr) => {
        match $self {
            GateServices::InMemory { service: $service, .. } => $call,
            GateServices::Postgres { service: $service, .. } => $call,
        }
    };
}

impl GateServices {
    /// In-memory wiring with the system clock.
    pub fn in_memory(config: &GateConfig) -> Self {
        Self::in_memory_with_clock(config, Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(config: &GateConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(InMemoryGateStore::new());
        let bus = Arc::new(RelationBus::new());
        let service = RelationService::new(store.clone(), store.clone(), bus.clone(), clock)
            .with_settings(RelationServiceSettings::from(config));

        GateServices::InMemory {
            store,
            bus,
            service: Arc::new(service),
        }
    }

    /// Connect to Postgres and apply the schema.
    pub async fn postgres(database_url: &str, config: &GateConfig) -> Result<Self, StoreError> {
        let store = Arc::new(PostgresGateStore::connect(database_url, config.db_max_connections).await?);
        store.migrate().await?;

        let bus = Arc::new(RelationBus::new());
        let service = RelationService::new(store.clone(), store.clone(), bus.clone(), Arc::new(SystemClock))
            .with_settings(RelationServiceSettings::from(config));

        Ok(GateServices::Postgres {
            store,
            bus,
            service: Arc::new(service),
        })
    }

    /// Postgres when a database URL is configured, in-memory otherwise.
    pub async fn from_config(config: &GateConfig) -> Result<Self, StoreError> {
        match config.database_url.as_deref() {
            Some(url) => {
                tracing::info!(max_connections = config.db_max_connections, "using postgres relation store");
                Self::postgres(url, config).await
            }
            None => {
                tracing::info!("using in-memory relation store");
                Ok(Self::in_memory(config))
            }
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            GateServices::InMemory { .. } => "in-memory",
            GateServices::Postgres { .. } => "postgres",
        }
    }

    pub fn bus(&self) -> &Arc<RelationBus> {
        match self {
            GateServices::InMemory { bus, .. } => bus,
            GateServices::Postgres { bus, .. } => bus,
        }
    }

    /// Subscribe to committed relation changes.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<RelationEvent>> {
        self.bus().subscribe()
    }

    pub fn page_request(&self, page: Option<u32>, size: Option<u32>) -> PageRequest {
        dispatch!(self, service => service.page_request(page, size))
    }

    pub async fn create_input_relations(
        &self,
        tenant: &TenantBpnl,
        requests: Vec<NewInputRelation>,
    ) -> Result<Vec<Relation>, RelationError> {
        dispatch!(self, service => service.create_input_relations(tenant, requests).await)
    }

    pub async fn upsert_input_relations(
        &self,
        tenant: &TenantBpnl,
        requests: Vec<InputRelationUpsert>,
    ) -> Result<Vec<Relation>, RelationError> {
        dispatch!(self, service => service.upsert_input_relations(tenant, requests).await)
    }

    pub async fn update_input_relations(
        &self,
        tenant: &TenantBpnl,
        requests: Vec<InputRelationUpsert>,
    ) -> Result<Vec<Relation>, RelationError> {
        dispatch!(self, service => service.update_input_relations(tenant, requests).await)
    }

    pub async fn delete_relation(&self, tenant: &TenantBpnl, external_id: &ExternalId) -> Result<(), RelationError> {
        dispatch!(self, service => service.delete_relation(tenant, external_id).await)
    }

    pub async fn upsert_output_relations(
        &self,
        requests: Vec<OutputRelationUpsert>,
    ) -> Result<Vec<Relation>, RelationError> {
        dispatch!(self, service => service.upsert_output_relations(requests).await)
    }

    pub async fn claim_relations_for_sharing(&self, limit: usize) -> Result<Vec<RelationSharingTask>, RelationError> {
        dispatch!(self, service => service.claim_relations_for_sharing(limit).await)
    }

    pub async fn report_sharing_errors(&self, reports: Vec<SharingErrorReport>) -> Result<Vec<Relation>, RelationError> {
        dispatch!(self, service => service.report_sharing_errors(reports).await)
    }

    pub async fn find_relation(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Option<Relation>, RelationError> {
        dispatch!(self, service => service.find_relation(tenant, external_id).await)
    }

    pub async fn find_input_relations(
        &self,
        tenant: &TenantBpnl,
        filter: &InputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<InputRelation>, RelationError> {
        dispatch!(self, service => service.find_input_relations(tenant, filter, page).await)
    }

    pub async fn find_output_relations(
        &self,
        tenant: &TenantBpnl,
        filter: &OutputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<OutputRelation>, RelationError> {
        dispatch!(self, service => service.find_output_relations(tenant, filter, page).await)
    }

    pub async fn find_sharing_states(
        &self,
        tenant: &TenantBpnl,
        filter: &SharingStateFilter,
        page: PageRequest,
    ) -> Result<Page<RelationSharingStateView>, RelationError> {
        dispatch!(self, service => service.find_sharing_states(tenant, filter, page).await)
    }
}
