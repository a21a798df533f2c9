use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::Repository;
use crate::backend::{Filter, Order};
use crate::error::Result;
use crate::models::{Contact, Interaction, InteractionInput, InteractionPatch, InteractionType};
use crate::query::keys::{BY_CONTACT, BY_OPPORTUNITY, BY_ORGANIZATION, CONTACTS, INTERACTIONS};
use crate::CrmContext;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InteractionFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<InteractionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_required: Option<bool>,
}

impl InteractionFilters {
    fn to_filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();
        if let Some(id) = self.contact_id {
            filters.push(Filter::eq("contact_id", id.to_string()));
        }
        if let Some(id) = self.organization_id {
            filters.push(Filter::eq("organization_id", id.to_string()));
        }
        if let Some(id) = self.opportunity_id {
            filters.push(Filter::eq("opportunity_id", id.to_string()));
        }
        if let Some(kind) = self.interaction_type {
            filters.push(Filter::eq("type", kind.as_str()));
        }
        if let Some(flag) = self.follow_up_required {
            filters.push(Filter::eq("follow_up_required", flag));
        }
        filters
    }
}

#[derive(Clone)]
pub struct InteractionRepository {
    repo: Repository<Interaction>,
    contacts: Repository<Contact>,
}

impl InteractionRepository {
    pub fn new(ctx: CrmContext) -> Self {
        Self {
            repo: Repository::new(ctx.clone(), INTERACTIONS),
            contacts: Repository::new(ctx, CONTACTS),
        }
    }

    pub fn repository(&self) -> &Repository<Interaction> {
        &self.repo
    }

    pub async fn list(&self, filters: &InteractionFilters) -> Result<Arc<Vec<Interaction>>> {
        self.repo
            .list_where(
                INTERACTIONS.list(filters),
                filters.to_filters(),
                Some(Order::desc("interaction_date")),
            )
            .await
    }

    pub async fn by_contact(&self, contact_id: Uuid) -> Result<Arc<Vec<Interaction>>> {
        self.related(BY_CONTACT, "contact_id", contact_id).await
    }

    pub async fn by_organization(&self, organization_id: Uuid) -> Result<Arc<Vec<Interaction>>> {
        self.related(BY_ORGANIZATION, "organization_id", organization_id)
            .await
    }

    pub async fn by_opportunity(&self, opportunity_id: Uuid) -> Result<Arc<Vec<Interaction>>> {
        self.related(BY_OPPORTUNITY, "opportunity_id", opportunity_id)
            .await
    }

    async fn related(&self, relation: &str, column: &str, id: Uuid) -> Result<Arc<Vec<Interaction>>> {
        self.repo
            .list_where(
                INTERACTIONS.relation(relation, id),
                vec![Filter::eq(column, id.to_string())],
                Some(Order::desc("interaction_date")),
            )
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Interaction>> {
        self.repo.get(id).await
    }

    /// Logs an interaction and moves the contact's `last_interaction_at`
    /// forward when this one is newer.
    pub async fn create(&self, input: &InteractionInput) -> Result<Interaction> {
        let interaction = self.repo.create(input).await?;
        if let Some(contact_id) = interaction.contact_id {
            if let Err(e) = self.touch_contact(contact_id, &interaction).await {
                log::warn!(
                    "Interaction {} saved but contact {} was not updated: {}",
                    interaction.id,
                    contact_id,
                    e
                );
            }
        }
        Ok(interaction)
    }

    async fn touch_contact(&self, contact_id: Uuid, interaction: &Interaction) -> Result<()> {
        let contact = self.contacts.load(contact_id).await?;
        if contact
            .last_interaction_at
            .is_some_and(|at| at >= interaction.interaction_date)
        {
            return Ok(());
        }

        let mut values = Map::new();
        values.insert(
            "last_interaction_at".into(),
            Value::String(interaction.interaction_date.to_rfc3339()),
        );
        self.contacts
            .update_where(vec![Filter::id(contact_id)], values)
            .await?;
        Ok(())
    }

    pub async fn update(&self, id: Uuid, patch: &InteractionPatch) -> Result<Interaction> {
        self.repo.update(id, patch).await
    }

    pub async fn soft_delete(&self, id: Uuid) -> Result<()> {
        self.repo.soft_delete(id).await
    }
}
