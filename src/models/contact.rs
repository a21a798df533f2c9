use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{require_non_empty, Audit, Entity, EntityInput, Organization};
use crate::backend::Embed;
use crate::error::{CrmError, Result};
use crate::query::keys::{KeyFactory, QueryKey, BY_ORGANIZATION, CONTACTS, INTERACTIONS, PRIMARY};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

pub(crate) fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() || EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(CrmError::validation("email", "is not a valid email address"))
    }
}

/// How much weight the contact carries in purchase decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseInfluence {
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl PurchaseInfluence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PurchaseInfluence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The contact's role in the buying process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAuthority {
    DecisionMaker,
    Influencer,
    EndUser,
    Gatekeeper,
}

impl DecisionAuthority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DecisionMaker => "decision_maker",
            Self::Influencer => "influencer",
            Self::EndUser => "end_user",
            Self::Gatekeeper => "gatekeeper",
        }
    }
}

impl fmt::Display for DecisionAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contact row with its owning organization embedded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile_phone: Option<String>,
    pub organization_id: Uuid,
    #[serde(default)]
    pub purchase_influence: PurchaseInfluence,
    #[serde(default)]
    pub decision_authority: Option<DecisionAuthority>,
    #[serde(default)]
    pub is_primary_contact: bool,
    #[serde(default)]
    pub last_interaction_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub audit: Audit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Organization>,
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn organization_name(&self) -> Option<&str> {
        self.organization.as_ref().map(|o| o.name.as_str())
    }

    pub fn is_decision_maker(&self) -> bool {
        self.decision_authority == Some(DecisionAuthority::DecisionMaker)
    }
}

impl Entity for Contact {
    const TABLE: &'static str = "contacts";
    const NAME: &'static str = "contact";
    const RELATION_COLUMNS: &'static [&'static str] = &["organization_id"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn embeds() -> Vec<Embed> {
        vec![Embed::inner("organization", "organizations", "organization_id")]
    }

    fn related_keys(&self) -> Vec<QueryKey> {
        vec![
            CONTACTS.relation(BY_ORGANIZATION, self.organization_id),
            CONTACTS.relation(PRIMARY, self.organization_id),
        ]
    }

    fn embedded_by() -> Vec<KeyFactory> {
        vec![INTERACTIONS]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactInput {
    pub first_name: String,
    pub last_name: String,
    pub organization_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,
    pub purchase_influence: PurchaseInfluence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_authority: Option<DecisionAuthority>,
    pub is_primary_contact: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ContactInput {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        organization_id: Uuid,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            organization_id,
            title: None,
            email: None,
            phone: None,
            mobile_phone: None,
            purchase_influence: PurchaseInfluence::Unknown,
            decision_authority: None,
            is_primary_contact: false,
            notes: None,
        }
    }
}

impl EntityInput for ContactInput {
    fn validate(&self) -> Result<()> {
        require_non_empty("first_name", &self.first_name)?;
        require_non_empty("last_name", &self.last_name)?;
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }

    fn related_keys(&self) -> Vec<QueryKey> {
        vec![
            CONTACTS.relation(BY_ORGANIZATION, self.organization_id),
            CONTACTS.relation(PRIMARY, self.organization_id),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_influence: Option<PurchaseInfluence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_authority: Option<DecisionAuthority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_primary_contact: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_interaction_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl EntityInput for ContactPatch {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.first_name {
            require_non_empty("first_name", name)?;
        }
        if let Some(name) = &self.last_name {
            require_non_empty("last_name", name)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_names_and_bad_email() {
        let org = Uuid::new_v4();
        let mut input = ContactInput::new("Ada", "  ", org);
        assert!(matches!(
            input.validate(),
            Err(CrmError::Validation { ref field, .. }) if field == "last_name"
        ));

        input.last_name = "Lovelace".into();
        input.email = Some("not-an-email".into());
        assert!(input.validate().is_err());

        input.email = Some("ada@example.com".into());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn decodes_row_with_embedded_organization() {
        let row = serde_json::json!({
            "id": "6f1c1c66-7a3a-4a43-9d0e-2c1c7b0c8e11",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "organization_id": "0b3d2c5e-1111-4a43-9d0e-2c1c7b0c8e11",
            "decision_authority": "decision_maker",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "organization": {
                "id": "0b3d2c5e-1111-4a43-9d0e-2c1c7b0c8e11",
                "name": "Acme",
                "type": "customer",
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z"
            }
        });

        let contact: Contact = serde_json::from_value(row).unwrap();
        assert_eq!(contact.full_name(), "Ada Lovelace");
        assert_eq!(contact.organization_name(), Some("Acme"));
        assert!(contact.is_decision_maker());
        assert_eq!(contact.purchase_influence, PurchaseInfluence::Unknown);
    }
}
