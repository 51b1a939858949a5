use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bpgate_core::{Aggregate, AggregateRoot, Bpnl, DomainError, ExternalId, RelationId, TenantBpnl};
use bpgate_events::Event;

use crate::output::RelationOutput;
use crate::partner::ResolvedPartner;
use crate::relation_type::RelationType;
use crate::sharing_state::{RelationSharingState, RelationSharingStateType};
use crate::stage::{RelationStage, StageType, StageValues};

pub const RELATION_AGGREGATE_TYPE: &str = "relations.relation";

/// Aggregate root: a tenant-asserted relation between two business partners.
///
/// Identity is `(tenant, external_id)`; `id` is the surrogate key stages refer to.
/// The aggregate owns its input stage, its sharing state and, once promoted, its
/// published output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    id: RelationId,
    tenant: TenantBpnl,
    external_id: ExternalId,
    input: Option<RelationStage>,
    sharing_state: Option<RelationSharingState>,
    output: Option<RelationOutput>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    created: bool,
    deleted: bool,
}

/// Persisted form of a relation, used by stores to rebuild the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSnapshot {
    pub id: RelationId,
    pub tenant: TenantBpnl,
    pub external_id: ExternalId,
    pub input: Option<RelationStage>,
    pub sharing_state: Option<RelationSharingState>,
    pub output: Option<RelationOutput>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Relation {
    /// Create an empty, not-yet-created aggregate for the given identity.
    pub fn empty(id: RelationId, tenant: TenantBpnl, external_id: ExternalId) -> Self {
        Self {
            id,
            tenant,
            external_id,
            input: None,
            sharing_state: None,
            output: None,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    /// Rebuild a persisted relation.
    pub fn restore(snapshot: RelationSnapshot) -> Self {
        Self {
            id: snapshot.id,
            tenant: snapshot.tenant,
            external_id: snapshot.external_id,
            input: snapshot.input,
            sharing_state: snapshot.sharing_state,
            output: snapshot.output,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            version: snapshot.version,
            created: true,
            deleted: false,
        }
    }

    pub fn snapshot(&self) -> RelationSnapshot {
        RelationSnapshot {
            id: self.id,
            tenant: self.tenant.clone(),
            external_id: self.external_id.clone(),
            input: self.input.clone(),
            sharing_state: self.sharing_state.clone(),
            output: self.output.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }

    pub fn relation_id(&self) -> RelationId {
        self.id
    }

    pub fn tenant(&self) -> &TenantBpnl {
        &self.tenant
    }

    pub fn external_id(&self) -> &ExternalId {
        &self.external_id
    }

    pub fn input(&self) -> Option<&RelationStage> {
        self.input.as_ref()
    }

    /// Stage lookup by kind. Only the input stage is stored as a stage row; the
    /// output lives on the relation itself.
    pub fn stage(&self, stage: StageType) -> Option<&RelationStage> {
        match stage {
            StageType::Input => self.input.as_ref(),
            StageType::Output => None,
        }
    }

    pub fn sharing_state(&self) -> Option<&RelationSharingState> {
        self.sharing_state.as_ref()
    }

    pub fn output(&self) -> Option<&RelationOutput> {
        self.output.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_created(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_in_error_state(&self) -> bool {
        self.sharing_state
            .as_ref()
            .is_some_and(RelationSharingState::is_error)
    }
}

impl AggregateRoot for Relation {
    type Id = RelationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInputRelation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInputRelation {
    pub relation_type: RelationType,
    pub source: ResolvedPartner,
    pub target: ResolvedPartner,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateInputRelation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInputRelation {
    pub relation_type: RelationType,
    pub source: ResolvedPartner,
    pub target: ResolvedPartner,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PublishOutput (promotion by the upstream identity resolver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutput {
    pub relation_type: RelationType,
    pub source_bpnl: Bpnl,
    pub target_bpnl: Bpnl,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartSharing (claimed by the sharing process).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartSharing {
    pub occurred_at: DateTime<Utc>,
}

/// Command: FailSharing (downstream processing error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailSharing {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteRelation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRelation {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationCommand {
    CreateInputRelation(CreateInputRelation),
    UpdateInputRelation(UpdateInputRelation),
    PublishOutput(PublishOutput),
    StartSharing(StartSharing),
    FailSharing(FailSharing),
    DeleteRelation(DeleteRelation),
}

/// Event: InputRelationCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRelationCreated {
    pub relation_id: RelationId,
    pub external_id: ExternalId,
    pub relation_type: RelationType,
    pub source: ResolvedPartner,
    pub target: ResolvedPartner,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InputRelationUpdated (the stage values really changed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRelationUpdated {
    pub relation_id: RelationId,
    pub relation_type: RelationType,
    pub source: ResolvedPartner,
    pub target: ResolvedPartner,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SharingStateReset (back to Initial for reprocessing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingStateReset {
    pub relation_id: RelationId,
    pub relation_type: RelationType,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SharingStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingStarted {
    pub relation_id: RelationId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SharingFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingFailed {
    pub relation_id: RelationId,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OutputPublished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPublished {
    pub relation_id: RelationId,
    pub output: RelationOutput,
}

/// Event: RelationDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDeleted {
    pub relation_id: RelationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationEvent {
    InputRelationCreated(InputRelationCreated),
    InputRelationUpdated(InputRelationUpdated),
    SharingStateReset(SharingStateReset),
    SharingStarted(SharingStarted),
    SharingFailed(SharingFailed),
    OutputPublished(OutputPublished),
    RelationDeleted(RelationDeleted),
}

impl Event for RelationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RelationEvent::InputRelationCreated(_) => "relations.input.created",
            RelationEvent::InputRelationUpdated(_) => "relations.input.updated",
            RelationEvent::SharingStateReset(_) => "relations.sharing.reset",
            RelationEvent::SharingStarted(_) => "relations.sharing.started",
            RelationEvent::SharingFailed(_) => "relations.sharing.failed",
            RelationEvent::OutputPublished(_) => "relations.output.published",
            RelationEvent::RelationDeleted(_) => "relations.relation.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RelationEvent::InputRelationCreated(e) => e.occurred_at,
            RelationEvent::InputRelationUpdated(e) => e.occurred_at,
            RelationEvent::SharingStateReset(e) => e.occurred_at,
            RelationEvent::SharingStarted(e) => e.occurred_at,
            RelationEvent::SharingFailed(e) => e.occurred_at,
            RelationEvent::OutputPublished(e) => e.output.updated_at,
            RelationEvent::RelationDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Relation {
    type Command = RelationCommand;
    type Event = RelationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RelationEvent::InputRelationCreated(e) => {
                self.input = Some(RelationStage {
                    relation_id: self.id,
                    stage: StageType::Input,
                    relation_type: e.relation_type,
                    source: e.source.id,
                    target: e.target.id,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                });
                self.sharing_state = Some(RelationSharingState::initial(e.relation_type, e.occurred_at));
                self.created_at = e.occurred_at;
                self.updated_at = e.occurred_at;
                self.created = true;
            }
            RelationEvent::InputRelationUpdated(e) => {
                // Mutated in place: the stage keeps its created_at.
                if let Some(stage) = self.input.as_mut() {
                    stage.relation_type = e.relation_type;
                    stage.source = e.source.id;
                    stage.target = e.target.id;
                    stage.updated_at = e.occurred_at;
                }
                self.updated_at = e.occurred_at;
            }
            RelationEvent::SharingStateReset(e) => {
                match self.sharing_state.as_mut() {
                    Some(state) => state.mark_initial(e.relation_type, e.occurred_at),
                    None => {
                        self.sharing_state = Some(RelationSharingState::initial(e.relation_type, e.occurred_at))
                    }
                }
                self.updated_at = e.occurred_at;
            }
            RelationEvent::SharingStarted(e) => {
                if let Some(state) = self.sharing_state.as_mut() {
                    state.mark_pending(e.occurred_at);
                }
                self.updated_at = e.occurred_at;
            }
            RelationEvent::SharingFailed(e) => {
                if let Some(state) = self.sharing_state.as_mut() {
                    state.mark_error(e.message.clone(), e.occurred_at);
                }
                self.updated_at = e.occurred_at;
            }
            RelationEvent::OutputPublished(e) => {
                let at = e.output.updated_at;
                match self.sharing_state.as_mut() {
                    Some(state) => state.mark_success(at),
                    None => {
                        let mut state = RelationSharingState::initial(e.output.relation_type, at);
                        state.mark_success(at);
                        self.sharing_state = Some(state);
                    }
                }
                self.output = Some(e.output.clone());
                self.updated_at = at;
            }
            RelationEvent::RelationDeleted(e) => {
                self.input = None;
                self.deleted = true;
                self.updated_at = e.occurred_at;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RelationCommand::CreateInputRelation(cmd) => self.handle_create(cmd),
            RelationCommand::UpdateInputRelation(cmd) => self.handle_update(cmd),
            RelationCommand::PublishOutput(cmd) => self.handle_publish(cmd),
            RelationCommand::StartSharing(cmd) => self.handle_start_sharing(cmd),
            RelationCommand::FailSharing(cmd) => self.handle_fail_sharing(cmd),
            RelationCommand::DeleteRelation(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Relation {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.is_created() {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_distinct(source: &ResolvedPartner, target: &ResolvedPartner) -> Result<(), DomainError> {
        if source.id == target.id || source.external_id == target.external_id {
            return Err(DomainError::validation(format!(
                "source and target '{}' must differ",
                source.external_id
            )));
        }
        Ok(())
    }

    fn current_sharing_state(&self) -> Result<&RelationSharingState, DomainError> {
        self.sharing_state
            .as_ref()
            .ok_or_else(|| DomainError::invariant("relation has no sharing state"))
    }

    fn handle_create(&self, cmd: &CreateInputRelation) -> Result<Vec<RelationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("relation already exists"));
        }
        Self::ensure_distinct(&cmd.source, &cmd.target)?;

        Ok(vec![RelationEvent::InputRelationCreated(InputRelationCreated {
            relation_id: self.id,
            external_id: self.external_id.clone(),
            relation_type: cmd.relation_type,
            source: cmd.source.clone(),
            target: cmd.target.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateInputRelation) -> Result<Vec<RelationEvent>, DomainError> {
        self.ensure_exists()?;
        Self::ensure_distinct(&cmd.source, &cmd.target)?;
        let stage = self.input.as_ref().ok_or_else(DomainError::not_found)?;

        let new_values = StageValues {
            relation_type: cmd.relation_type,
            source: cmd.source.id,
            target: cmd.target.id,
        };
        let has_changes = new_values != stage.values();
        let is_in_error_state = self.is_in_error_state();

        let mut events = Vec::new();
        if has_changes {
            events.push(RelationEvent::InputRelationUpdated(InputRelationUpdated {
                relation_id: self.id,
                relation_type: cmd.relation_type,
                source: cmd.source.clone(),
                target: cmd.target.clone(),
                occurred_at: cmd.occurred_at,
            }));
        }
        if has_changes || is_in_error_state {
            events.push(RelationEvent::SharingStateReset(SharingStateReset {
                relation_id: self.id,
                relation_type: cmd.relation_type,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_publish(&self, cmd: &PublishOutput) -> Result<Vec<RelationEvent>, DomainError> {
        self.ensure_exists()?;
        if cmd.source_bpnl == cmd.target_bpnl {
            return Err(DomainError::validation(format!(
                "source and target BPNL '{}' must differ",
                cmd.source_bpnl
            )));
        }

        Ok(vec![RelationEvent::OutputPublished(OutputPublished {
            relation_id: self.id,
            output: RelationOutput {
                relation_type: cmd.relation_type,
                source_bpnl: cmd.source_bpnl.clone(),
                target_bpnl: cmd.target_bpnl.clone(),
                updated_at: cmd.occurred_at,
            },
        })])
    }

    fn handle_start_sharing(&self, cmd: &StartSharing) -> Result<Vec<RelationEvent>, DomainError> {
        self.ensure_exists()?;
        self.current_sharing_state()?
            .ensure_can_transition_to(RelationSharingStateType::Pending)?;

        Ok(vec![RelationEvent::SharingStarted(SharingStarted {
            relation_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fail_sharing(&self, cmd: &FailSharing) -> Result<Vec<RelationEvent>, DomainError> {
        self.ensure_exists()?;
        if cmd.message.trim().is_empty() {
            return Err(DomainError::validation("error message cannot be empty"));
        }
        self.current_sharing_state()?
            .ensure_can_transition_to(RelationSharingStateType::Error)?;

        Ok(vec![RelationEvent::SharingFailed(SharingFailed {
            relation_id: self.id,
            message: cmd.message.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteRelation) -> Result<Vec<RelationEvent>, DomainError> {
        self.ensure_exists()?;
        if self.input.is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![RelationEvent::RelationDeleted(RelationDeleted {
            relation_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
