//! Business partner relations domain module.
//!
//! This crate contains the business rules for tenant-asserted relations between
//! business partners (e.g. "is managed by"): the input/output stages, the sharing
//! state machine and the `Relation` aggregate. Everything here is deterministic
//! domain logic (no IO, no storage); partner resolution against the Sharing Ledger
//! happens in the infra layer before commands are built.

pub mod filter;
pub mod output;
pub mod partner;
pub mod relation;
pub mod relation_type;
pub mod sharing_state;
pub mod stage;
pub mod view;

pub use filter::{InputRelationFilter, OutputRelationFilter, SharingStateFilter};
pub use output::RelationOutput;
pub use partner::{ResolvedPartner, SharingStateRecord, SharingStateType};
pub use relation::{
    CreateInputRelation, DeleteRelation, FailSharing, InputRelationCreated, InputRelationUpdated,
    OutputPublished, PublishOutput, Relation, RelationCommand, RelationDeleted, RelationEvent,
    RelationSnapshot, SharingFailed, SharingStarted, SharingStateReset, StartSharing,
    UpdateInputRelation, RELATION_AGGREGATE_TYPE,
};
pub use relation_type::RelationType;
pub use sharing_state::{RelationSharingState, RelationSharingStateType};
pub use stage::{RelationStage, StageType, StageValues};
pub use view::{InputRelation, OutputRelation, PartnerReference, RelationSharingStateView, RelationSharingTask};
