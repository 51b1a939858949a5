use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bpgate_core::{DomainError, RelationId, SharingStateId, ValueObject};

use crate::relation_type::RelationType;

/// Stage discriminator of a relation stage row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageType {
    Input,
    Output,
}

impl StageType {
    pub fn as_str(self) -> &'static str {
        match self {
            StageType::Input => "Input",
            StageType::Output => "Output",
        }
    }
}

impl FromStr for StageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Input" => Ok(StageType::Input),
            "Output" => Ok(StageType::Output),
            other => Err(DomainError::validation(format!("unknown stage '{other}'"))),
        }
    }
}

/// One stage of a relation. Owned by exactly one relation.
///
/// `source` and `target` are foreign keys into the Sharing Ledger, resolved when
/// the stage was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationStage {
    pub relation_id: RelationId,
    pub stage: StageType,
    pub relation_type: RelationType,
    pub source: SharingStateId,
    pub target: SharingStateId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelationStage {
    pub fn values(&self) -> StageValues {
        StageValues {
            relation_type: self.relation_type,
            source: self.source,
            target: self.target,
        }
    }
}

/// The part of a stage that decides whether an update is a real change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageValues {
    pub relation_type: RelationType,
    pub source: SharingStateId,
    pub target: SharingStateId,
}

impl ValueObject for StageValues {}
