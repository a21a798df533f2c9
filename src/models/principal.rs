use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Audit, Entity, EntityInput};
use crate::error::{CrmError, Result};
use crate::query::keys::{QueryKey, BY_CONTACT, PREFERRED_PRINCIPALS};

/// Strength of a contact's preference for a principal, 1 (weak) to 10.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct AdvocacyStrength(u8);

impl AdvocacyStrength {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CrmError::validation(
                "advocacy_strength",
                format!("must be between {} and {}", Self::MIN, Self::MAX),
            ))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for AdvocacyStrength {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for AdvocacyStrength {
    type Error = CrmError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AdvocacyStrength> for u8 {
    fn from(value: AdvocacyStrength) -> Self {
        value.0
    }
}

/// Join row: `contact` favours the principal organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferredPrincipal {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub principal_organization_id: Uuid,
    #[serde(default)]
    pub advocacy_strength: AdvocacyStrength,
    #[serde(flatten)]
    pub audit: Audit,
}

impl Entity for PreferredPrincipal {
    const TABLE: &'static str = "contact_preferred_principals";
    const NAME: &'static str = "preferred principal";
    const RELATION_COLUMNS: &'static [&'static str] = &["contact_id"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn related_keys(&self) -> Vec<QueryKey> {
        vec![PREFERRED_PRINCIPALS.relation(BY_CONTACT, self.contact_id)]
    }
}

/// A principal chosen on the contact form, before the contact exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PrincipalPreference {
    pub principal_organization_id: Uuid,
    pub advocacy_strength: AdvocacyStrength,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct PreferredPrincipalInput {
    pub contact_id: Uuid,
    pub principal_organization_id: Uuid,
    pub advocacy_strength: AdvocacyStrength,
}

impl EntityInput for PreferredPrincipalInput {
    fn related_keys(&self) -> Vec<QueryKey> {
        vec![PREFERRED_PRINCIPALS.relation(BY_CONTACT, self.contact_id)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_is_bounded() {
        assert!(AdvocacyStrength::new(0).is_err());
        assert!(AdvocacyStrength::new(11).is_err());
        assert_eq!(AdvocacyStrength::new(7).unwrap().get(), 7);
        assert!(serde_json::from_value::<AdvocacyStrength>(serde_json::json!(42)).is_err());
    }
}
