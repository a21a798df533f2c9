use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{require_non_empty, Audit, Entity, EntityInput};
use crate::error::{CrmError, Result};
use crate::query::keys::{KeyFactory, QueryKey, BY_CONTACT, BY_ORGANIZATION, INTERACTIONS, OPPORTUNITIES};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStage {
    #[default]
    NewLead,
    InitialOutreach,
    SampleVisitOffered,
    AwaitingResponse,
    FeedbackLogged,
    DemoScheduled,
    ClosedWon,
    ClosedLost,
}

impl OpportunityStage {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opportunity {
    pub id: Uuid,
    pub name: String,
    pub organization_id: Uuid,
    #[serde(default)]
    pub contact_id: Option<Uuid>,
    #[serde(default)]
    pub stage: OpportunityStage,
    #[serde(default)]
    pub estimated_value: Option<f64>,
    #[serde(default)]
    pub estimated_close_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub audit: Audit,
}

fn relation_keys(organization_id: Uuid, contact_id: Option<Uuid>) -> Vec<QueryKey> {
    let mut keys = vec![OPPORTUNITIES.relation(BY_ORGANIZATION, organization_id)];
    if let Some(id) = contact_id {
        keys.push(OPPORTUNITIES.relation(BY_CONTACT, id));
    }
    keys
}

impl Entity for Opportunity {
    const TABLE: &'static str = "opportunities";
    const NAME: &'static str = "opportunity";
    const RELATION_COLUMNS: &'static [&'static str] = &["organization_id", "contact_id"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn related_keys(&self) -> Vec<QueryKey> {
        relation_keys(self.organization_id, self.contact_id)
    }

    fn embedded_by() -> Vec<KeyFactory> {
        vec![INTERACTIONS]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpportunityInput {
    pub name: String,
    pub organization_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<Uuid>,
    pub stage: OpportunityStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_close_date: Option<NaiveDate>,
}

impl EntityInput for OpportunityInput {
    fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        if self.estimated_value.is_some_and(|v| v < 0.0) {
            return Err(CrmError::validation("estimated_value", "cannot be negative"));
        }
        Ok(())
    }

    fn related_keys(&self) -> Vec<QueryKey> {
        relation_keys(self.organization_id, self.contact_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OpportunityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<OpportunityStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_close_date: Option<NaiveDate>,
}

impl EntityInput for OpportunityPatch {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        Ok(())
    }
}
