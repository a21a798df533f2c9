use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::Repository;
use crate::backend::{Filter, Order};
use crate::error::Result;
use crate::models::{Opportunity, OpportunityInput, OpportunityPatch, OpportunityStage};
use crate::query::keys::{BY_ORGANIZATION, OPPORTUNITIES};
use crate::CrmContext;

const OPEN_STAGES: &[OpportunityStage] = &[
    OpportunityStage::NewLead,
    OpportunityStage::InitialOutreach,
    OpportunityStage::SampleVisitOffered,
    OpportunityStage::AwaitingResponse,
    OpportunityStage::FeedbackLogged,
    OpportunityStage::DemoScheduled,
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OpportunityFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<OpportunityStage>,
    #[serde(default)]
    pub open_only: bool,
}

impl OpportunityFilters {
    fn to_filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            filters.push(Filter::contains("name", search));
        }
        if let Some(id) = self.organization_id {
            filters.push(Filter::eq("organization_id", id.to_string()));
        }
        if let Some(stage) = self.stage {
            filters.push(Filter::eq("stage", stage_value(stage)));
        }
        if self.open_only {
            filters.push(Filter::any_of(
                "stage",
                OPEN_STAGES.iter().map(|s| stage_value(*s)),
            ));
        }
        filters
    }
}

fn stage_value(stage: OpportunityStage) -> serde_json::Value {
    serde_json::to_value(stage).unwrap_or(serde_json::Value::Null)
}

#[derive(Clone)]
pub struct OpportunityRepository {
    repo: Repository<Opportunity>,
}

impl OpportunityRepository {
    pub fn new(ctx: CrmContext) -> Self {
        Self {
            repo: Repository::new(ctx, OPPORTUNITIES),
        }
    }

    pub fn repository(&self) -> &Repository<Opportunity> {
        &self.repo
    }

    pub async fn list(&self, filters: &OpportunityFilters) -> Result<Arc<Vec<Opportunity>>> {
        self.repo
            .list_where(
                OPPORTUNITIES.list(filters),
                filters.to_filters(),
                Some(Order::asc("name")),
            )
            .await
    }

    pub async fn by_organization(&self, organization_id: Uuid) -> Result<Arc<Vec<Opportunity>>> {
        self.repo
            .list_where(
                OPPORTUNITIES.relation(BY_ORGANIZATION, organization_id),
                vec![Filter::eq("organization_id", organization_id.to_string())],
                Some(Order::asc("name")),
            )
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Opportunity>> {
        self.repo.get(id).await
    }

    pub async fn create(&self, input: &OpportunityInput) -> Result<Opportunity> {
        self.repo.create(input).await
    }

    pub async fn update(&self, id: Uuid, patch: &OpportunityPatch) -> Result<Opportunity> {
        self.repo.update(id, patch).await
    }

    pub async fn soft_delete(&self, id: Uuid) -> Result<()> {
        self.repo.soft_delete(id).await
    }
}
