use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use bpgate_core::{AggregateRoot, ExternalId, Page, PageRequest, RelationId, SharingStateId, TenantBpnl};
use bpgate_relations::{
    InputRelation, InputRelationFilter, OutputRelation, OutputRelationFilter, Relation, RelationSharingStateType,
    RelationSharingStateView, RelationStage, SharingStateFilter, SharingStateRecord, StageType,
};

use super::r#trait::{RelationChange, RelationStore, StoreError};
use crate::sharing_ledger::SharingLedger;

#[derive(Debug, Default, Clone)]
struct RelationTables {
    relations: HashMap<RelationId, Relation>,
    keys: HashMap<(TenantBpnl, ExternalId), RelationId>,
}

impl RelationTables {
    fn apply(&mut self, change: RelationChange) -> Result<(), StoreError> {
        match change {
            RelationChange::Insert(relation) => {
                let key = (relation.tenant().clone(), relation.external_id().clone());
                if self.keys.contains_key(&key) {
                    let (tenant, external_id) = key;
                    return Err(StoreError::DuplicateExternalId { tenant, external_id });
                }
                self.keys.insert(key, *relation.id());
                self.relations.insert(*relation.id(), relation);
            }
            RelationChange::Update {
                relation,
                expected_version,
            } => {
                let current = self.current_version(relation.id())?;
                if !expected_version.matches(current) {
                    return Err(StoreError::Concurrency(format!(
                        "relation {}: expected {expected_version:?}, found {current}",
                        relation.id()
                    )));
                }
                self.relations.insert(*relation.id(), relation);
            }
            RelationChange::Delete {
                relation_id,
                expected_version,
            } => {
                let current = self.current_version(&relation_id)?;
                if !expected_version.matches(current) {
                    return Err(StoreError::Concurrency(format!(
                        "relation {relation_id}: expected {expected_version:?}, found {current}"
                    )));
                }
                if let Some(removed) = self.relations.remove(&relation_id) {
                    self.keys
                        .remove(&(removed.tenant().clone(), removed.external_id().clone()));
                }
            }
        }
        Ok(())
    }

    fn current_version(&self, relation_id: &RelationId) -> Result<u64, StoreError> {
        self.relations
            .get(relation_id)
            .map(|r| r.version())
            .ok_or_else(|| StoreError::Concurrency(format!("relation {relation_id} no longer exists")))
    }

    /// Tenant relations in creation order.
    fn ordered_for(&self, tenant: &TenantBpnl) -> Vec<&Relation> {
        let mut relations: Vec<&Relation> = self
            .relations
            .values()
            .filter(|r| r.tenant() == tenant)
            .collect();
        relations.sort_by_key(|r| (r.created_at(), *r.id()));
        relations
    }
}

/// In-memory Relation Store and Sharing Ledger.
///
/// Intended for tests/dev. `commit` applies a batch to a copy of the tables and
/// swaps it in only when every change succeeded.
#[derive(Debug, Default)]
pub struct InMemoryGateStore {
    tables: RwLock<RelationTables>,
    sharing_states: RwLock<Vec<SharingStateRecord>>,
}

impl InMemoryGateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a ledger record. Duplicate `(tenant, external id)` pairs are kept as-is.
    pub fn insert_sharing_state(&self, record: SharingStateRecord) {
        if let Ok(mut states) = self.sharing_states.write() {
            states.push(record);
        }
    }

    /// Replace the ledger record of the same `(tenant, external id)`, or add it.
    pub fn upsert_sharing_state(&self, record: SharingStateRecord) {
        if let Ok(mut states) = self.sharing_states.write() {
            match states
                .iter_mut()
                .find(|s| s.tenant == record.tenant && s.external_id == record.external_id)
            {
                Some(existing) => *existing = record,
                None => states.push(record),
            }
        }
    }

    fn read_tables(&self) -> Result<std::sync::RwLockReadGuard<'_, RelationTables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn partner_external_ids(&self) -> Result<HashMap<SharingStateId, ExternalId>, StoreError> {
        let states = self
            .sharing_states
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(states.iter().map(|s| (s.id, s.external_id.clone())).collect())
    }
}

#[async_trait]
impl SharingLedger for InMemoryGateStore {
    async fn find_partner_records(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Vec<SharingStateRecord>, StoreError> {
        let states = self
            .sharing_states
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(states
            .iter()
            .filter(|s| &s.tenant == tenant && &s.external_id == external_id)
            .cloned()
            .collect())
    }

    async fn find_partner_records_by_ids(&self, ids: &[SharingStateId]) -> Result<Vec<SharingStateRecord>, StoreError> {
        let wanted: HashSet<&SharingStateId> = ids.iter().collect();
        let states = self
            .sharing_states
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(states.iter().filter(|s| wanted.contains(&s.id)).cloned().collect())
    }
}

#[async_trait]
impl RelationStore for InMemoryGateStore {
    async fn find_by_external_id(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Option<Relation>, StoreError> {
        let tables = self.read_tables()?;
        Ok(tables
            .keys
            .get(&(tenant.clone(), external_id.clone()))
            .and_then(|id| tables.relations.get(id))
            .cloned())
    }

    async fn find_stage(&self, relation_id: RelationId, stage: StageType) -> Result<Option<RelationStage>, StoreError> {
        let tables = self.read_tables()?;
        Ok(tables
            .relations
            .get(&relation_id)
            .and_then(|r| r.stage(stage))
            .cloned())
    }

    async fn find_by_sharing_state(
        &self,
        state: RelationSharingStateType,
        limit: usize,
    ) -> Result<Vec<Relation>, StoreError> {
        let tables = self.read_tables()?;
        let mut matching: Vec<&Relation> = tables
            .relations
            .values()
            .filter(|r| r.sharing_state().is_some_and(|s| s.state_type() == state))
            .collect();
        matching.sort_by_key(|r| {
            (
                r.sharing_state().map(|s| s.updated_at()),
                r.created_at(),
                *r.id(),
            )
        });
        Ok(matching.into_iter().take(limit).cloned().collect())
    }

    async fn commit(&self, changes: Vec<RelationChange>) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let mut staged = tables.clone();
        for change in changes {
            staged.apply(change)?;
        }
        *tables = staged;
        Ok(())
    }

    async fn search_input(
        &self,
        tenant: &TenantBpnl,
        filter: &InputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<InputRelation>, StoreError> {
        let partners = self.partner_external_ids()?;
        let tables = self.read_tables()?;
        let matching = tables
            .ordered_for(tenant)
            .into_iter()
            .filter_map(|r| {
                let stage = r.input()?;
                let source = partners.get(&stage.source)?.clone();
                let target = partners.get(&stage.target)?.clone();
                InputRelation::from_relation(r, source, target)
            })
            .filter(|view| filter.matches(view))
            .collect();
        Ok(Page::from_sorted(page, matching))
    }

    async fn search_output(
        &self,
        tenant: &TenantBpnl,
        filter: &OutputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<OutputRelation>, StoreError> {
        let tables = self.read_tables()?;
        let matching = tables
            .ordered_for(tenant)
            .into_iter()
            .filter_map(OutputRelation::from_relation)
            .filter(|view| filter.matches(view))
            .collect();
        Ok(Page::from_sorted(page, matching))
    }

    async fn search_sharing_states(
        &self,
        tenant: &TenantBpnl,
        filter: &SharingStateFilter,
        page: PageRequest,
    ) -> Result<Page<RelationSharingStateView>, StoreError> {
        let tables = self.read_tables()?;
        let matching = tables
            .ordered_for(tenant)
            .into_iter()
            .filter_map(RelationSharingStateView::from_relation)
            .filter(|view| filter.matches(view))
            .collect();
        Ok(Page::from_sorted(page, matching))
    }
}
