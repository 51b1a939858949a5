//! Query filters for relation searches.
//!
//! Every field is optional: an empty list or `None` means "do not filter on this".
//! Non-empty lists match any of their values. Filters are always evaluated within a
//! single tenant, which the store receives separately.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bpgate_core::{Bpnl, ExternalId};

use crate::relation_type::RelationType;
use crate::sharing_state::RelationSharingStateType;
use crate::view::{InputRelation, OutputRelation, RelationSharingStateView};

fn any_or_empty<T: PartialEq>(allowed: &[T], value: &T) -> bool {
    allowed.is_empty() || allowed.contains(value)
}

fn at_or_after(bound: Option<DateTime<Utc>>, value: DateTime<Utc>) -> bool {
    bound.is_none_or(|b| value >= b)
}

/// Filter on input stage fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputRelationFilter {
    pub external_ids: Vec<ExternalId>,
    pub relation_types: Vec<RelationType>,
    pub source_external_ids: Vec<ExternalId>,
    pub target_external_ids: Vec<ExternalId>,
    /// Inclusive lower bound on the stage's `updated_at`.
    pub updated_after: Option<DateTime<Utc>>,
}

impl InputRelationFilter {
    pub fn matches(&self, relation: &InputRelation) -> bool {
        any_or_empty(&self.external_ids, &relation.external_id)
            && any_or_empty(&self.relation_types, &relation.relation_type)
            && any_or_empty(&self.source_external_ids, &relation.source_external_id)
            && any_or_empty(&self.target_external_ids, &relation.target_external_id)
            && at_or_after(self.updated_after, relation.updated_at)
    }
}

/// Filter on published outputs. Relations without an output never match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputRelationFilter {
    pub external_ids: Vec<ExternalId>,
    pub relation_types: Vec<RelationType>,
    pub source_bpnls: Vec<Bpnl>,
    pub target_bpnls: Vec<Bpnl>,
    pub updated_after: Option<DateTime<Utc>>,
}

impl OutputRelationFilter {
    pub fn matches(&self, relation: &OutputRelation) -> bool {
        any_or_empty(&self.external_ids, &relation.external_id)
            && any_or_empty(&self.relation_types, &relation.relation_type)
            && any_or_empty(&self.source_bpnls, &relation.source_bpnl)
            && any_or_empty(&self.target_bpnls, &relation.target_bpnl)
            && at_or_after(self.updated_after, relation.updated_at)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SharingStateFilter {
    pub external_ids: Vec<ExternalId>,
    pub state_types: Vec<RelationSharingStateType>,
}

impl SharingStateFilter {
    pub fn matches(&self, state: &RelationSharingStateView) -> bool {
        any_or_empty(&self.external_ids, &state.external_id)
            && any_or_empty(&self.state_types, &state.sharing_state_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ext(s: &str) -> ExternalId {
        ExternalId::parse(s).unwrap()
    }

    fn input(at: DateTime<Utc>) -> InputRelation {
        InputRelation {
            external_id: ext("R1"),
            relation_type: RelationType::IsManagedBy,
            source_external_id: ext("P1"),
            target_external_id: ext("P2"),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(InputRelationFilter::default().matches(&input(at)));
    }

    #[test]
    fn list_fields_match_any_value() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let filter = InputRelationFilter {
            source_external_ids: vec![ext("P9"), ext("P1")],
            relation_types: vec![RelationType::IsManagedBy],
            ..Default::default()
        };
        assert!(filter.matches(&input(at)));

        let filter = InputRelationFilter {
            target_external_ids: vec![ext("P1")],
            ..Default::default()
        };
        assert!(!filter.matches(&input(at)));
    }

    #[test]
    fn updated_after_is_inclusive() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let inclusive = InputRelationFilter { updated_after: Some(at), ..Default::default() };
        assert!(inclusive.matches(&input(at)));

        let later = InputRelationFilter { updated_after: Some(at + Duration::seconds(1)), ..Default::default() };
        assert!(!later.matches(&input(at)));
    }

    #[test]
    fn sharing_state_filter_by_state_type() {
        let view = RelationSharingStateView {
            external_id: ext("R1"),
            relation_type: RelationType::IsOwnedBy,
            sharing_state_type: RelationSharingStateType::Error,
            error_message: Some("boom".to_string()),
            updated_at: Utc::now(),
        };
        let errors = SharingStateFilter {
            state_types: vec![RelationSharingStateType::Error],
            ..Default::default()
        };
        assert!(errors.matches(&view));

        let pending = SharingStateFilter {
            state_types: vec![RelationSharingStateType::Pending],
            ..Default::default()
        };
        assert!(!pending.matches(&view));
    }
}
