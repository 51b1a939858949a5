//! Relation Reconciliation Engine.
//!
//! Orchestrates every relation mutation:
//!
//! ```text
//! request batch
//!   ↓
//! 1. Resolve partner references through the Sharing Ledger
//!   ↓
//! 2. Load relations (through the unit of work, so a batch sees its own writes)
//!   ↓
//! 3. Handle commands on the `Relation` aggregate (pure decision logic)
//!   ↓
//! 4. Commit all changes in one store transaction
//!   ↓
//! 5. Publish the resulting events on the bus
//! ```
//!
//! Any error aborts the whole call before step 4; nothing is written and nothing
//! is published. Publication happens only after a successful commit.

pub mod request;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use bpgate_core::{AggregateRoot, Clock, ExternalId, Page, PageRequest, RelationId, SharingStateId, TenantBpnl};
use bpgate_events::{EventBus, EventEnvelope};
use bpgate_relations::{
    CreateInputRelation, DeleteRelation, FailSharing, InputRelation, InputRelationFilter, OutputRelation,
    OutputRelationFilter, PartnerReference, PublishOutput, Relation, RelationCommand, RelationEvent,
    RelationSharingStateType, RelationSharingStateView, RelationSharingTask, RelationType, ResolvedPartner,
    SharingStateFilter, SharingStateRecord, StartSharing, UpdateInputRelation,
};

use crate::config::GateConfig;
use crate::error::RelationError;
use crate::relation_store::{RelationStore, StoreError};
use crate::sharing_ledger::SharingLedger;
use crate::unit_of_work::UnitOfWork;

pub use request::{InputRelationUpsert, NewInputRelation, OutputRelationUpsert, SharingErrorReport};

/// Tunables of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationServiceSettings {
    /// Upper bound for any requested page size.
    pub max_page_size: u32,
    pub default_page_size: u32,
    /// How often an upsert batch is replayed after losing an insert race.
    pub upsert_retries: u32,
}

impl Default for RelationServiceSettings {
    fn default() -> Self {
        Self {
            max_page_size: 1000,
            default_page_size: 50,
            upsert_retries: 1,
        }
    }
}

impl From<&GateConfig> for RelationServiceSettings {
    fn from(config: &GateConfig) -> Self {
        Self {
            max_page_size: config.max_page_size,
            default_page_size: config.default_page_size,
            upsert_retries: config.upsert_retries,
        }
    }
}

/// Which endpoint of a relation a partner reference belongs to.
#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Source,
    Target,
}

/// The reconciliation engine.
///
/// - `S`: Relation Store
/// - `L`: Sharing Ledger
/// - `B`: event bus receiving committed relation changes
pub struct RelationService<S, L, B> {
    store: S,
    ledger: L,
    bus: B,
    clock: Arc<dyn Clock>,
    settings: RelationServiceSettings,
}

impl<S, L, B> RelationService<S, L, B> {
    pub fn new(store: S, ledger: L, bus: B, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ledger,
            bus,
            clock,
            settings: RelationServiceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RelationServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> RelationServiceSettings {
        self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Build a page request, defaulting and capping the size.
    pub fn page_request(&self, page: Option<u32>, size: Option<u32>) -> PageRequest {
        PageRequest::new(page.unwrap_or(0), size.unwrap_or(self.settings.default_page_size))
            .clamped(self.settings.max_page_size)
    }
}

impl<S, L, B> RelationService<S, L, B>
where
    S: RelationStore,
    L: SharingLedger,
    B: EventBus<EventEnvelope<RelationEvent>>,
{
    /// Create new input relations. All-or-nothing.
    #[instrument(skip(self, requests), fields(tenant = %tenant, count = requests.len()), err)]
    pub async fn create_input_relations(
        &self,
        tenant: &TenantBpnl,
        requests: Vec<NewInputRelation>,
    ) -> Result<Vec<Relation>, RelationError> {
        let now = self.clock.now();
        let mut uow = UnitOfWork::new(&self.store);
        let mut created = Vec::with_capacity(requests.len());

        for request in requests {
            let external_id = match request.external_id {
                Some(external_id) => {
                    if uow.load(tenant, &external_id).await?.is_some() {
                        return Err(RelationError::AlreadyExists { external_id });
                    }
                    external_id
                }
                None => ExternalId::generate(),
            };

            let relation = self
                .create_in(
                    &mut uow,
                    tenant,
                    external_id,
                    request.relation_type,
                    &request.source_external_id,
                    &request.target_external_id,
                    now,
                )
                .await?;
            created.push(relation);
        }

        self.finish(uow).await?;
        Ok(created)
    }

    /// Create or update input relations by external id. All-or-nothing.
    ///
    /// Losing an insert race against a concurrent writer replays the batch, which
    /// then sees the winner's relation and updates it.
    #[instrument(skip(self, requests), fields(tenant = %tenant, count = requests.len()), err)]
    pub async fn upsert_input_relations(
        &self,
        tenant: &TenantBpnl,
        requests: Vec<InputRelationUpsert>,
    ) -> Result<Vec<Relation>, RelationError> {
        let mut attempt = 0;
        loop {
            match self.try_upsert_input_relations(tenant, &requests).await {
                Err(RelationError::AlreadyExists { external_id }) if attempt < self.settings.upsert_retries => {
                    attempt += 1;
                    info!(
                        external_id = %external_id,
                        attempt,
                        "lost insert race, retrying upsert batch"
                    );
                }
                other => return other,
            }
        }
    }

    async fn try_upsert_input_relations(
        &self,
        tenant: &TenantBpnl,
        requests: &[InputRelationUpsert],
    ) -> Result<Vec<Relation>, RelationError> {
        let now = self.clock.now();
        let mut uow = UnitOfWork::new(&self.store);
        let mut upserted = Vec::with_capacity(requests.len());

        for request in requests {
            let relation = match uow.load(tenant, &request.external_id).await? {
                Some(existing) => self.update_in(&mut uow, existing, request, now).await?,
                None => {
                    self.create_in(
                        &mut uow,
                        tenant,
                        request.external_id.clone(),
                        request.relation_type,
                        &request.source_external_id,
                        &request.target_external_id,
                        now,
                    )
                    .await?
                }
            };
            upserted.push(relation);
        }

        self.finish(uow).await?;
        Ok(upserted)
    }

    /// Update existing input relations. All-or-nothing.
    #[instrument(skip(self, requests), fields(tenant = %tenant, count = requests.len()), err)]
    pub async fn update_input_relations(
        &self,
        tenant: &TenantBpnl,
        requests: Vec<InputRelationUpsert>,
    ) -> Result<Vec<Relation>, RelationError> {
        let now = self.clock.now();
        let mut uow = UnitOfWork::new(&self.store);
        let mut updated = Vec::with_capacity(requests.len());

        for request in &requests {
            let existing = uow
                .load(tenant, &request.external_id)
                .await?
                .ok_or_else(|| RelationError::NotFound {
                    external_id: request.external_id.clone(),
                })?;
            updated.push(self.update_in(&mut uow, existing, request, now).await?);
        }

        self.finish(uow).await?;
        Ok(updated)
    }

    /// Delete a relation together with its input stage.
    #[instrument(skip(self), fields(tenant = %tenant, external_id = %external_id), err)]
    pub async fn delete_relation(&self, tenant: &TenantBpnl, external_id: &ExternalId) -> Result<(), RelationError> {
        let now = self.clock.now();
        let mut uow = UnitOfWork::new(&self.store);

        let relation = uow
            .load(tenant, external_id)
            .await?
            .ok_or_else(|| RelationError::NotFound {
                external_id: external_id.clone(),
            })?;
        uow.execute(
            relation,
            &RelationCommand::DeleteRelation(DeleteRelation { occurred_at: now }),
        )
        .map_err(|e| RelationError::from_domain(e, external_id))?;

        self.finish(uow).await
    }

    /// Promote relations to their published output and mark them shared.
    ///
    /// The output is always overwritten with the submitted values.
    #[instrument(skip(self, requests), fields(count = requests.len()), err)]
    pub async fn upsert_output_relations(
        &self,
        requests: Vec<OutputRelationUpsert>,
    ) -> Result<Vec<Relation>, RelationError> {
        let now = self.clock.now();
        let mut uow = UnitOfWork::new(&self.store);
        let mut published = Vec::with_capacity(requests.len());

        for request in requests {
            if request.source_bpnl == request.target_bpnl {
                return Err(RelationError::InvalidRelation(format!(
                    "source and target BPNL '{}' must differ",
                    request.source_bpnl
                )));
            }

            let relation = uow
                .load(&request.tenant, &request.external_id)
                .await?
                .ok_or_else(|| RelationError::NotFound {
                    external_id: request.external_id.clone(),
                })?;
            let relation = uow
                .execute(
                    relation,
                    &RelationCommand::PublishOutput(PublishOutput {
                        relation_type: request.relation_type,
                        source_bpnl: request.source_bpnl,
                        target_bpnl: request.target_bpnl,
                        occurred_at: now,
                    }),
                )
                .map_err(|e| RelationError::from_domain(e, &request.external_id))?;
            published.push(relation);
        }

        self.finish(uow).await?;
        Ok(published)
    }

    /// Move up to `limit` relations from `Initial` to `Pending` and hand them out
    /// as sharing tasks, oldest first.
    ///
    /// Each relation is claimed in its own commit. A relation another writer
    /// changed since it was selected (typically a concurrent claim) is skipped,
    /// so the result may hold fewer than `limit` tasks.
    #[instrument(skip(self), err)]
    pub async fn claim_relations_for_sharing(&self, limit: usize) -> Result<Vec<RelationSharingTask>, RelationError> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let now = self.clock.now();
        let candidates = self
            .store
            .find_by_sharing_state(RelationSharingStateType::Initial, limit)
            .await?;

        let mut claims = Vec::with_capacity(candidates.len());
        for relation in candidates {
            let mut uow = UnitOfWork::new(&self.store);
            uow.attach(relation.clone());
            let external_id = relation.external_id().clone();
            let relation = uow
                .execute(
                    relation,
                    &RelationCommand::StartSharing(StartSharing { occurred_at: now }),
                )
                .map_err(|e| RelationError::from_domain(e, &external_id))?;
            claims.push((relation, uow));
        }

        let relations: Vec<Relation> = claims.iter().map(|(relation, _)| relation.clone()).collect();
        let tasks = self.sharing_tasks(&relations).await?;

        let mut claimed = Vec::with_capacity(tasks.len());
        let mut events = Vec::new();
        for ((relation, uow), task) in claims.into_iter().zip(tasks) {
            match uow.commit().await {
                Ok(committed) => {
                    events.extend(committed);
                    claimed.push(task);
                }
                Err(StoreError::Concurrency(reason)) => {
                    debug!(
                        external_id = %relation.external_id(),
                        reason = %reason,
                        "relation changed since selection, skipping claim"
                    );
                }
                Err(err) => {
                    self.publish(events)?;
                    return Err(err.into());
                }
            }
        }

        self.publish(events)?;
        Ok(claimed)
    }

    /// Record downstream failures. Only relations in `Initial` or `Pending` accept one.
    #[instrument(skip(self, reports), fields(count = reports.len()), err)]
    pub async fn report_sharing_errors(&self, reports: Vec<SharingErrorReport>) -> Result<Vec<Relation>, RelationError> {
        let now = self.clock.now();
        let mut uow = UnitOfWork::new(&self.store);
        let mut failed = Vec::with_capacity(reports.len());

        for report in reports {
            let relation = uow
                .load(&report.tenant, &report.external_id)
                .await?
                .ok_or_else(|| RelationError::NotFound {
                    external_id: report.external_id.clone(),
                })?;
            let relation = uow
                .execute(
                    relation,
                    &RelationCommand::FailSharing(FailSharing {
                        message: report.message,
                        occurred_at: now,
                    }),
                )
                .map_err(|e| RelationError::from_domain(e, &report.external_id))?;
            failed.push(relation);
        }

        self.finish(uow).await?;
        Ok(failed)
    }

    /// Point lookup of a relation.
    pub async fn find_relation(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Option<Relation>, RelationError> {
        Ok(self.store.find_by_external_id(tenant, external_id).await?)
    }

    #[instrument(skip(self, filter), fields(tenant = %tenant), err)]
    pub async fn find_input_relations(
        &self,
        tenant: &TenantBpnl,
        filter: &InputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<InputRelation>, RelationError> {
        let page = page.clamped(self.settings.max_page_size);
        Ok(self.store.search_input(tenant, filter, page).await?)
    }

    #[instrument(skip(self, filter), fields(tenant = %tenant), err)]
    pub async fn find_output_relations(
        &self,
        tenant: &TenantBpnl,
        filter: &OutputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<OutputRelation>, RelationError> {
        let page = page.clamped(self.settings.max_page_size);
        Ok(self.store.search_output(tenant, filter, page).await?)
    }

    #[instrument(skip(self, filter), fields(tenant = %tenant), err)]
    pub async fn find_sharing_states(
        &self,
        tenant: &TenantBpnl,
        filter: &SharingStateFilter,
        page: PageRequest,
    ) -> Result<Page<RelationSharingStateView>, RelationError> {
        let page = page.clamped(self.settings.max_page_size);
        Ok(self.store.search_sharing_states(tenant, filter, page).await?)
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_in(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        tenant: &TenantBpnl,
        external_id: ExternalId,
        relation_type: RelationType,
        source: &ExternalId,
        target: &ExternalId,
        now: DateTime<Utc>,
    ) -> Result<Relation, RelationError> {
        ensure_distinct(source, target)?;
        let source = self.resolve(tenant, source, Endpoint::Source).await?;
        let target = self.resolve(tenant, target, Endpoint::Target).await?;

        let relation = Relation::empty(RelationId::new(), tenant.clone(), external_id.clone());
        let relation = uow
            .execute(
                relation,
                &RelationCommand::CreateInputRelation(CreateInputRelation {
                    relation_type,
                    source,
                    target,
                    occurred_at: now,
                }),
            )
            .map_err(|e| RelationError::from_domain(e, &external_id))?;

        debug!(external_id = %external_id, relation_type = %relation_type, "input relation created");
        Ok(relation)
    }

    async fn update_in(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        existing: Relation,
        request: &InputRelationUpsert,
        now: DateTime<Utc>,
    ) -> Result<Relation, RelationError> {
        ensure_distinct(&request.source_external_id, &request.target_external_id)?;
        let tenant = existing.tenant().clone();
        let source = self
            .resolve(&tenant, &request.source_external_id, Endpoint::Source)
            .await?;
        let target = self
            .resolve(&tenant, &request.target_external_id, Endpoint::Target)
            .await?;

        let version_before = existing.version();
        let relation = uow
            .execute(
                existing,
                &RelationCommand::UpdateInputRelation(UpdateInputRelation {
                    relation_type: request.relation_type,
                    source,
                    target,
                    occurred_at: now,
                }),
            )
            .map_err(|e| RelationError::from_domain(e, &request.external_id))?;

        if relation.version() == version_before {
            debug!(external_id = %request.external_id, "input relation unchanged");
        }
        Ok(relation)
    }

    async fn resolve(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
        endpoint: Endpoint,
    ) -> Result<ResolvedPartner, RelationError> {
        match self.ledger.lookup(tenant, external_id).await? {
            Some(record) => Ok(record.resolved()),
            None => {
                let external_id = external_id.clone();
                Err(match endpoint {
                    Endpoint::Source => RelationError::SourceNotFound { external_id },
                    Endpoint::Target => RelationError::TargetNotFound { external_id },
                })
            }
        }
    }

    async fn sharing_tasks(&self, relations: &[Relation]) -> Result<Vec<RelationSharingTask>, RelationError> {
        let ids: Vec<SharingStateId> = relations
            .iter()
            .filter_map(Relation::input)
            .flat_map(|stage| [stage.source, stage.target])
            .collect();
        let records: HashMap<SharingStateId, SharingStateRecord> = self
            .ledger
            .find_partner_records_by_ids(&ids)
            .await?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        let reference = |relation: &Relation, id: SharingStateId| -> Result<PartnerReference, RelationError> {
            let record = records.get(&id).ok_or_else(|| {
                RelationError::Store(StoreError::Corrupt(format!(
                    "sharing state {id} referenced by relation '{}' is missing",
                    relation.external_id()
                )))
            })?;
            Ok(PartnerReference {
                external_id: record.external_id.clone(),
                bpnl: record.bpnl.clone(),
            })
        };

        relations
            .iter()
            .map(|relation| {
                let stage = relation.input().ok_or_else(|| RelationError::NotFound {
                    external_id: relation.external_id().clone(),
                })?;
                Ok(RelationSharingTask {
                    tenant: relation.tenant().clone(),
                    external_id: relation.external_id().clone(),
                    relation_type: stage.relation_type,
                    source: reference(relation, stage.source)?,
                    target: reference(relation, stage.target)?,
                })
            })
            .collect()
    }

    /// Commit the unit of work, then publish its events.
    async fn finish(&self, uow: UnitOfWork<'_, S>) -> Result<(), RelationError> {
        let events = uow.commit().await?;
        self.publish(events)
    }

    /// Publish already committed events.
    fn publish(&self, events: Vec<EventEnvelope<RelationEvent>>) -> Result<(), RelationError> {
        if events.is_empty() {
            return Ok(());
        }

        for envelope in &events {
            debug!(
                event_type = bpgate_events::Event::event_type(envelope.payload()),
                relation_id = %envelope.aggregate_id(),
                "relation event committed"
            );
        }
        let count = events.len();
        for envelope in events {
            self.bus
                .publish(envelope)
                .map_err(|err| RelationError::Publish(format!("{err:?}")))?;
        }
        info!(event_count = count, "relation changes committed");
        Ok(())
    }
}

fn ensure_distinct(source: &ExternalId, target: &ExternalId) -> Result<(), RelationError> {
    if source == target {
        return Err(RelationError::InvalidRelation(format!(
            "source and target '{source}' must differ"
        )));
    }
    Ok(())
}
