use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{require_non_empty, Audit, Contact, Entity, EntityInput, Opportunity, Organization};
use crate::backend::Embed;
use crate::error::{CrmError, Result};
use crate::query::keys::{QueryKey, BY_CONTACT, BY_OPPORTUNITY, BY_ORGANIZATION, INTERACTIONS};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Call,
    Email,
    Meeting,
    Demo,
    Proposal,
    FollowUp,
    TradeShow,
    SiteVisit,
    ContractReview,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Email => "email",
            Self::Meeting => "meeting",
            Self::Demo => "demo",
            Self::Proposal => "proposal",
            Self::FollowUp => "follow_up",
            Self::TradeShow => "trade_show",
            Self::SiteVisit => "site_visit",
            Self::ContractReview => "contract_review",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub interaction_type: InteractionType,
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    pub interaction_date: DateTime<Utc>,
    #[serde(default)]
    pub contact_id: Option<Uuid>,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub opportunity_id: Option<Uuid>,
    #[serde(default)]
    pub follow_up_required: bool,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub audit: Audit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Organization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opportunity: Option<Opportunity>,
}

impl Interaction {
    /// A follow-up is overdue once its date has passed.
    pub fn is_follow_up_overdue(&self, today: NaiveDate) -> bool {
        self.follow_up_required && self.follow_up_date.is_some_and(|d| d < today)
    }
}

fn relation_keys(
    contact_id: Option<Uuid>,
    organization_id: Option<Uuid>,
    opportunity_id: Option<Uuid>,
) -> Vec<QueryKey> {
    let mut keys = Vec::new();
    if let Some(id) = contact_id {
        keys.push(INTERACTIONS.relation(BY_CONTACT, id));
    }
    if let Some(id) = organization_id {
        keys.push(INTERACTIONS.relation(BY_ORGANIZATION, id));
    }
    if let Some(id) = opportunity_id {
        keys.push(INTERACTIONS.relation(BY_OPPORTUNITY, id));
    }
    keys
}

impl Entity for Interaction {
    const TABLE: &'static str = "interactions";
    const NAME: &'static str = "interaction";
    const RELATION_COLUMNS: &'static [&'static str] =
        &["contact_id", "organization_id", "opportunity_id"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn embeds() -> Vec<Embed> {
        vec![
            Embed::new("contact", "contacts", "contact_id"),
            Embed::new("organization", "organizations", "organization_id"),
            Embed::new("opportunity", "opportunities", "opportunity_id"),
        ]
    }

    fn related_keys(&self) -> Vec<QueryKey> {
        relation_keys(self.contact_id, self.organization_id, self.opportunity_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionInput {
    #[serde(rename = "type")]
    pub interaction_type: InteractionType,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub interaction_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<Uuid>,
    pub follow_up_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<NaiveDate>,
}

impl EntityInput for InteractionInput {
    fn validate(&self) -> Result<()> {
        require_non_empty("subject", &self.subject)?;
        if self.contact_id.is_none() && self.organization_id.is_none() {
            return Err(CrmError::validation(
                "contact_id",
                "an interaction needs a contact or an organization",
            ));
        }
        if self.follow_up_required && self.follow_up_date.is_none() {
            return Err(CrmError::validation(
                "follow_up_date",
                "is required when a follow-up is requested",
            ));
        }
        Ok(())
    }

    fn related_keys(&self) -> Vec<QueryKey> {
        relation_keys(self.contact_id, self.organization_id, self.opportunity_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InteractionPatch {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<InteractionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<NaiveDate>,
}

impl EntityInput for InteractionPatch {
    fn validate(&self) -> Result<()> {
        if let Some(subject) = &self.subject {
            require_non_empty("subject", subject)?;
        }
        Ok(())
    }
}
