//! Unit of work over the Relation Store.
//!
//! Collects every relation touched by one engine call, lets later entries of a
//! batch observe the effects of earlier ones, and turns the result into one atomic
//! `commit`. Events are collected alongside and handed back for publication once
//! the commit succeeded.

use std::collections::HashMap;

use uuid::Uuid;

use bpgate_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion, ExternalId, TenantBpnl};
use bpgate_events::EventEnvelope;
use bpgate_relations::{RELATION_AGGREGATE_TYPE, Relation, RelationCommand, RelationEvent};

use crate::relation_store::{RelationChange, RelationStore, StoreError};

type RelationKey = (TenantBpnl, ExternalId);

#[derive(Debug)]
struct Tracked {
    /// Version as loaded from the store; `None` for relations created in this unit.
    persisted_version: Option<u64>,
    relation: Relation,
    dirty: bool,
}

#[derive(Debug)]
pub struct UnitOfWork<'s, S> {
    store: &'s S,
    order: Vec<RelationKey>,
    tracked: HashMap<RelationKey, Tracked>,
    events: Vec<EventEnvelope<RelationEvent>>,
}

impl<'s, S> UnitOfWork<'s, S>
where
    S: RelationStore,
{
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            order: Vec::new(),
            tracked: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Current state of a relation as seen by this unit of work.
    ///
    /// Relations deleted earlier in the unit are reported as absent.
    pub async fn load(
        &mut self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Option<Relation>, StoreError> {
        let key = (tenant.clone(), external_id.clone());
        if let Some(tracked) = self.tracked.get(&key) {
            return Ok(Some(tracked.relation.clone()).filter(Relation::is_created));
        }

        let loaded = self.store.find_by_external_id(tenant, external_id).await?;
        if let Some(relation) = &loaded {
            self.attach(relation.clone());
        }
        Ok(loaded)
    }

    /// Track a relation that was read from the store outside of [`load`](Self::load).
    pub fn attach(&mut self, relation: Relation) {
        let key = (relation.tenant().clone(), relation.external_id().clone());
        if self.tracked.contains_key(&key) {
            return;
        }
        self.order.push(key.clone());
        self.tracked.insert(
            key,
            Tracked {
                persisted_version: Some(relation.version()),
                relation,
                dirty: false,
            },
        );
    }

    /// Run a command against a relation and record the outcome.
    ///
    /// Relations not tracked yet are treated as new. An empty event list leaves the
    /// relation untouched.
    pub fn execute(&mut self, relation: Relation, command: &RelationCommand) -> Result<Relation, DomainError> {
        let events = relation.handle(command)?;
        let mut relation = relation;
        let base_version = relation.version();
        for event in &events {
            relation.apply(event);
        }

        for (offset, event) in events.iter().enumerate() {
            self.events.push(EventEnvelope::new(
                Uuid::now_v7(),
                relation.tenant().clone(),
                *relation.id(),
                RELATION_AGGREGATE_TYPE,
                base_version + offset as u64 + 1,
                event.clone(),
            ));
        }

        let key = (relation.tenant().clone(), relation.external_id().clone());
        match self.tracked.get_mut(&key) {
            Some(tracked) => {
                tracked.dirty |= !events.is_empty();
                tracked.relation = relation.clone();
            }
            None => {
                self.order.push(key.clone());
                self.tracked.insert(
                    key,
                    Tracked {
                        persisted_version: None,
                        relation: relation.clone(),
                        dirty: !events.is_empty(),
                    },
                );
            }
        }

        Ok(relation)
    }

    /// Store changes in the order relations were first touched.
    pub fn changes(&self) -> Vec<RelationChange> {
        self.order
            .iter()
            .filter_map(|key| self.tracked.get(key))
            .filter(|t| t.dirty)
            .filter_map(|t| match (t.persisted_version, t.relation.is_deleted()) {
                (None, false) => Some(RelationChange::Insert(t.relation.clone())),
                (None, true) => None,
                (Some(version), false) => Some(RelationChange::Update {
                    relation: t.relation.clone(),
                    expected_version: ExpectedVersion::Exact(version),
                }),
                (Some(version), true) => Some(RelationChange::Delete {
                    relation_id: *t.relation.id(),
                    expected_version: ExpectedVersion::Exact(version),
                }),
            })
            .collect()
    }

    /// Commit all changes atomically and return the events to publish.
    pub async fn commit(self) -> Result<Vec<EventEnvelope<RelationEvent>>, StoreError> {
        let changes = self.changes();
        if !changes.is_empty() {
            self.store.commit(changes).await?;
        }
        Ok(self.events)
    }
}
