pub mod contact;
pub mod interaction;
pub mod opportunity;
pub mod organization;
pub mod principal;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::Embed;
use crate::query::keys::{KeyFactory, QueryKey};

pub use contact::{Contact, ContactInput, ContactPatch, DecisionAuthority, PurchaseInfluence};
pub use interaction::{Interaction, InteractionInput, InteractionPatch, InteractionType};
pub use opportunity::{Opportunity, OpportunityInput, OpportunityPatch, OpportunityStage};
pub use organization::{
    Organization, OrganizationInput, OrganizationPatch, OrganizationPriority, OrganizationType,
};
pub use principal::{AdvocacyStrength, PreferredPrincipal, PrincipalPreference};

/// Audit columns carried by every table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub updated_by: Option<Uuid>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Audit {
    pub fn new(user: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            updated_at: at,
            created_by: Some(user),
            updated_by: Some(user),
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A row type stored in one backend table.
///
/// Implementors describe their table, the relations embedded on every read,
/// and the convenience views a write to the record can affect.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Backend table name.
    const TABLE: &'static str;
    /// Singular, human-readable name used in messages.
    const NAME: &'static str;
    /// Foreign-key columns that decide which relation views hold a record.
    const RELATION_COLUMNS: &'static [&'static str] = &[];

    fn id(&self) -> Uuid;

    fn audit(&self) -> &Audit;

    fn embeds() -> Vec<Embed> {
        Vec::new()
    }

    /// Relation-scoped cache keys holding this record, beyond the plain lists.
    fn related_keys(&self) -> Vec<QueryKey> {
        Vec::new()
    }

    /// Entities whose reads embed this one; their cached rows carry a copy.
    fn embedded_by() -> Vec<KeyFactory> {
        Vec::new()
    }
}

/// Input accepted by a create operation.
pub trait EntityInput: Serialize + Send + Sync {
    fn validate(&self) -> crate::error::Result<()> {
        Ok(())
    }

    /// Cache keys (besides the lists) the new record will show up under.
    fn related_keys(&self) -> Vec<QueryKey> {
        Vec::new()
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> crate::error::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::error::CrmError::validation(field, "is required"));
    }
    Ok(())
}
