use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{require_non_empty, Audit, Entity, EntityInput};
use crate::error::Result;
use crate::query::keys::{KeyFactory, CONTACTS, INTERACTIONS};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationType {
    Customer,
    Principal,
    Distributor,
    Prospect,
    Vendor,
    #[default]
    Unknown,
}

impl OrganizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Principal => "principal",
            Self::Distributor => "distributor",
            Self::Prospect => "prospect",
            Self::Vendor => "vendor",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OrganizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account priority, A being the most valuable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrganizationPriority {
    A,
    B,
    C,
    D,
}

impl OrganizationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type", default)]
    pub organization_type: OrganizationType,
    #[serde(default)]
    pub priority: Option<OrganizationPriority>,
    #[serde(default)]
    pub segment: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub is_principal: bool,
    #[serde(default)]
    pub is_distributor: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub audit: Audit,
}

impl Entity for Organization {
    const TABLE: &'static str = "organizations";
    const NAME: &'static str = "organization";

    fn id(&self) -> Uuid {
        self.id
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn embedded_by() -> Vec<KeyFactory> {
        vec![CONTACTS, INTERACTIONS]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizationInput {
    pub name: String,
    #[serde(rename = "type")]
    pub organization_type: OrganizationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<OrganizationPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub is_principal: bool,
    pub is_distributor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl OrganizationInput {
    /// Minimal input; the principal/distributor flags follow the type.
    pub fn named(name: impl Into<String>, organization_type: OrganizationType) -> Self {
        Self {
            name: name.into(),
            organization_type,
            priority: None,
            segment: None,
            city: None,
            phone: None,
            email: None,
            website: None,
            is_principal: organization_type == OrganizationType::Principal,
            is_distributor: organization_type == OrganizationType::Distributor,
            notes: None,
        }
    }
}

impl EntityInput for OrganizationInput {
    fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        if let Some(email) = &self.email {
            super::contact::validate_email(email)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrganizationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub organization_type: Option<OrganizationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<OrganizationPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl EntityInput for OrganizationPatch {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        if let Some(email) = &self.email {
            super::contact::validate_email(email)?;
        }
        Ok(())
    }
}
