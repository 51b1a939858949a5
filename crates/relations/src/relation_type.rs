use core::str::FromStr;

use serde::{Deserialize, Serialize};

use bpgate_core::DomainError;

/// Closed set of relation kinds a tenant can assert between two business partners.
///
/// Read as `source <type> target`, e.g. "source IsManagedBy target".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    IsAlternativeHeadquarterFor,
    IsManagedBy,
    IsOwnedBy,
}

impl RelationType {
    pub const ALL: [RelationType; 3] = [
        RelationType::IsAlternativeHeadquarterFor,
        RelationType::IsManagedBy,
        RelationType::IsOwnedBy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::IsAlternativeHeadquarterFor => "IsAlternativeHeadquarterFor",
            RelationType::IsManagedBy => "IsManagedBy",
            RelationType::IsOwnedBy => "IsOwnedBy",
        }
    }
}

impl core::fmt::Display for RelationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown relation type '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_form_matches_serde_form() {
        for t in RelationType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            assert_eq!(t.as_str().parse::<RelationType>().unwrap(), t);
        }
    }

    #[test]
    fn unknown_type_is_a_validation_error() {
        match "IsFriendOf".parse::<RelationType>() {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("IsFriendOf")),
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }
}
