//! Relation sharing state machine.
//!
//! ```text
//!            set_initial (any state, input created/changed or retried from Error)
//!                 │
//!                 ▼
//!   ┌────────► Initial ──start──► Pending
//!   │            │  │               │  │
//!   │            │  └──fail──┐ ┌─fail┘  │
//!   │            │           ▼ ▼        │
//!   │            │          Error       │
//!   │            │                      │
//!   │            └──publish──► Success ◄┘ publish
//!   │                            │
//!   └────────────────────────────┘ (only through a new input change)
//! ```
//!
//! The machine is driven exclusively by the `Relation` aggregate; callers never
//! set a state directly.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bpgate_core::{DomainError, DomainResult};

use crate::relation_type::RelationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationSharingStateType {
    /// Freshly (re)submitted, not yet picked up downstream.
    Initial,
    /// Claimed by the sharing process, waiting for resolved identifiers.
    Pending,
    /// Promoted to an output relation.
    Success,
    /// Downstream processing failed; see the error message.
    Error,
}

impl RelationSharingStateType {
    pub const ALL: [RelationSharingStateType; 4] = [
        RelationSharingStateType::Initial,
        RelationSharingStateType::Pending,
        RelationSharingStateType::Success,
        RelationSharingStateType::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RelationSharingStateType::Initial => "Initial",
            RelationSharingStateType::Pending => "Pending",
            RelationSharingStateType::Success => "Success",
            RelationSharingStateType::Error => "Error",
        }
    }

    /// Transition table of the sharing lifecycle.
    pub fn can_transition_to(self, next: RelationSharingStateType) -> bool {
        use RelationSharingStateType::*;
        match next {
            Initial | Success => true,
            Pending => self == Initial,
            Error => matches!(self, Initial | Pending),
        }
    }
}

impl core::fmt::Display for RelationSharingStateType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationSharingStateType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationSharingStateType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown relation sharing state '{s}'")))
    }
}

/// Current sharing state of one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSharingState {
    state_type: RelationSharingStateType,
    relation_type: RelationType,
    error_message: Option<String>,
    updated_at: DateTime<Utc>,
}

impl RelationSharingState {
    pub fn initial(relation_type: RelationType, at: DateTime<Utc>) -> Self {
        Self {
            state_type: RelationSharingStateType::Initial,
            relation_type,
            error_message: None,
            updated_at: at,
        }
    }

    /// Rebuild a persisted state. Stores only.
    pub fn restore(
        state_type: RelationSharingStateType,
        relation_type: RelationType,
        error_message: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            state_type,
            relation_type,
            error_message,
            updated_at,
        }
    }

    pub fn state_type(&self) -> RelationSharingStateType {
        self.state_type
    }

    /// Relation type the state was last (re)initialised for.
    pub fn relation_type(&self) -> RelationType {
        self.relation_type
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_error(&self) -> bool {
        self.state_type == RelationSharingStateType::Error
    }

    /// Check a transition without performing it.
    pub fn ensure_can_transition_to(&self, next: RelationSharingStateType) -> DomainResult<()> {
        if self.state_type.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "sharing state cannot move from {} to {}",
                self.state_type, next
            )))
        }
    }

    pub(crate) fn mark_initial(&mut self, relation_type: RelationType, at: DateTime<Utc>) {
        self.state_type = RelationSharingStateType::Initial;
        self.relation_type = relation_type;
        self.error_message = None;
        self.updated_at = at;
    }

    pub(crate) fn mark_pending(&mut self, at: DateTime<Utc>) {
        self.state_type = RelationSharingStateType::Pending;
        self.error_message = None;
        self.updated_at = at;
    }

    pub(crate) fn mark_success(&mut self, at: DateTime<Utc>) {
        self.state_type = RelationSharingStateType::Success;
        self.error_message = None;
        self.updated_at = at;
    }

    pub(crate) fn mark_error(&mut self, message: String, at: DateTime<Utc>) {
        self.state_type = RelationSharingStateType::Error;
        self.error_message = Some(message);
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RelationSharingStateType::*;

    fn at() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn initial_and_success_are_always_reachable() {
        for from in RelationSharingStateType::ALL {
            assert!(from.can_transition_to(Initial), "{from} -> Initial");
            assert!(from.can_transition_to(Success), "{from} -> Success");
        }
    }

    #[test]
    fn pending_only_from_initial() {
        assert!(Initial.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Success.can_transition_to(Pending));
        assert!(!Error.can_transition_to(Pending));
    }

    #[test]
    fn error_only_while_in_flight() {
        assert!(Initial.can_transition_to(Error));
        assert!(Pending.can_transition_to(Error));
        assert!(!Success.can_transition_to(Error));
        assert!(!Error.can_transition_to(Error));
    }

    #[test]
    fn ensure_can_transition_reports_conflict() {
        let state = RelationSharingState::restore(Success, RelationType::IsManagedBy, None, at());
        match state.ensure_can_transition_to(Pending) {
            Err(DomainError::Conflict(msg)) => assert!(msg.contains("Success to Pending")),
            other => panic!("Expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn reset_clears_error_message() {
        let mut state = RelationSharingState::initial(RelationType::IsOwnedBy, at());
        state.mark_error("pool rejected".to_string(), at());
        assert!(state.is_error());
        assert_eq!(state.error_message(), Some("pool rejected"));

        state.mark_initial(RelationType::IsManagedBy, at());
        assert_eq!(state.state_type(), Initial);
        assert_eq!(state.relation_type(), RelationType::IsManagedBy);
        assert_eq!(state.error_message(), None);
    }
}
