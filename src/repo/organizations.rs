use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{decode_rows, Repository};
use crate::backend::{Filter, Order, Select};
use crate::error::{CrmError, Result};
use crate::models::{
    Entity, Organization, OrganizationInput, OrganizationPatch, OrganizationPriority,
    OrganizationType,
};
use crate::query::keys::ORGANIZATIONS;
use crate::CrmContext;

const SEARCH_COLUMNS: &[&str] = &["name", "city", "segment", "email", "phone"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrganizationFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_type: Option<OrganizationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<OrganizationPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(default)]
    pub principals_only: bool,
    #[serde(default)]
    pub distributors_only: bool,
}

impl OrganizationFilters {
    fn to_filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            filters.push(Filter::search(SEARCH_COLUMNS, search));
        }
        if let Some(kind) = self.organization_type {
            filters.push(Filter::eq("type", kind.as_str()));
        }
        if let Some(priority) = self.priority {
            filters.push(Filter::eq("priority", priority.as_str()));
        }
        if let Some(segment) = &self.segment {
            filters.push(Filter::eq("segment", segment.as_str()));
        }
        if self.principals_only {
            filters.push(Filter::eq("is_principal", true));
        }
        if self.distributors_only {
            filters.push(Filter::eq("is_distributor", true));
        }
        filters
    }
}

#[derive(Clone)]
pub struct OrganizationRepository {
    repo: Repository<Organization>,
}

impl OrganizationRepository {
    pub fn new(ctx: CrmContext) -> Self {
        Self {
            repo: Repository::new(ctx, ORGANIZATIONS),
        }
    }

    pub fn repository(&self) -> &Repository<Organization> {
        &self.repo
    }

    pub async fn list(&self, filters: &OrganizationFilters) -> Result<Arc<Vec<Organization>>> {
        self.repo
            .list_where(
                ORGANIZATIONS.list(filters),
                filters.to_filters(),
                Some(Order::asc("name")),
            )
            .await
    }

    pub async fn principals(&self) -> Result<Arc<Vec<Organization>>> {
        self.list(&OrganizationFilters {
            principals_only: true,
            ..OrganizationFilters::default()
        })
        .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Organization>> {
        self.repo.get(id).await
    }

    pub async fn create(&self, input: &OrganizationInput) -> Result<Organization> {
        self.repo.create(input).await
    }

    pub async fn update(&self, id: Uuid, patch: &OrganizationPatch) -> Result<Organization> {
        self.repo.update(id, patch).await
    }

    pub async fn soft_delete(&self, id: Uuid) -> Result<()> {
        self.repo.soft_delete(id).await
    }

    /// Returns the live organization with exactly this name and type,
    /// inserting it when there is none. The lookup goes to the backend, not
    /// the cache.
    pub async fn find_or_create(
        &self,
        name: &str,
        organization_type: OrganizationType,
    ) -> Result<Organization> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CrmError::validation("organization_name", "is required"));
        }

        let query = Select::from(Organization::TABLE)
            .filter(Filter::eq("name", name))
            .filter(Filter::eq("type", organization_type.as_str()))
            .limit(1);
        let rows = self.repo.context().backend().select(&query).await?;
        if let Some(existing) = decode_rows::<Organization>(rows)?.into_iter().next() {
            log::debug!("Reusing organization {} ({})", existing.name, existing.id);
            return Ok(existing);
        }

        self.create(&OrganizationInput::named(name, organization_type))
            .await
    }
}
