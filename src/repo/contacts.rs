use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::Repository;
use crate::backend::{Filter, Order};
use crate::error::{CrmError, Result};
use crate::models::{
    Contact, ContactInput, ContactPatch, DecisionAuthority, EntityInput, Organization,
    OrganizationType, PreferredPrincipal, PrincipalPreference, PurchaseInfluence,
};
use crate::notify::Toast;
use crate::query::keys::{BY_ORGANIZATION, CONTACTS, PRIMARY};
use crate::CrmContext;

/// Columns matched by the free-text search box, the same fields the
/// in-memory contact search covers.
const SEARCH_COLUMNS: &[&str] = &[
    "first_name",
    "last_name",
    "title",
    "email",
    "organization.name",
    "phone",
    "mobile_phone",
];

/// Server-side narrowing for contact lists. Part of the cache key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_influence: Option<PurchaseInfluence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_authority: Option<DecisionAuthority>,
    #[serde(default)]
    pub primary_only: bool,
}

impl ContactFilters {
    fn to_filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            filters.push(Filter::search(SEARCH_COLUMNS, search));
        }
        if let Some(id) = self.organization_id {
            filters.push(Filter::eq("organization_id", id.to_string()));
        }
        if let Some(level) = self.purchase_influence {
            filters.push(Filter::eq("purchase_influence", level.as_str()));
        }
        if let Some(role) = self.decision_authority {
            filters.push(Filter::eq("decision_authority", role.as_str()));
        }
        if self.primary_only {
            filters.push(Filter::eq("is_primary_contact", true));
        }
        filters
    }
}

/// Where the contact's organization comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum OrganizationChoice {
    Existing(Uuid),
    /// Looked up by name and type, created when absent.
    Named {
        name: String,
        organization_type: OrganizationType,
    },
}

/// Input for the composite contact form. `contact.organization_id` is
/// replaced by the resolved organization.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactWithOrganization {
    pub contact: ContactInput,
    pub organization: OrganizationChoice,
    pub preferred_principals: Vec<PrincipalPreference>,
}

/// A preferred-principal link that could not be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalLinkFailure {
    pub principal_organization_id: Uuid,
    pub error: CrmError,
}

/// Outcome of [`ContactRepository::create_with_organization`].
///
/// The contact exists even when some principal links failed; those are
/// listed in `failed_principals`.
#[derive(Debug, Clone)]
pub struct ContactCreation {
    pub contact: Contact,
    /// Set when the organization was resolved by name.
    pub organization: Option<Organization>,
    pub preferred_principals: Vec<PreferredPrincipal>,
    pub failed_principals: Vec<PrincipalLinkFailure>,
}

impl ContactCreation {
    pub fn is_complete(&self) -> bool {
        self.failed_principals.is_empty()
    }
}

#[derive(Clone)]
pub struct ContactRepository {
    repo: Repository<Contact>,
}

impl ContactRepository {
    pub fn new(ctx: CrmContext) -> Self {
        Self {
            repo: Repository::new(ctx, CONTACTS),
        }
    }

    pub fn repository(&self) -> &Repository<Contact> {
        &self.repo
    }

    pub async fn list(&self, filters: &ContactFilters) -> Result<Arc<Vec<Contact>>> {
        self.repo
            .list_where(
                CONTACTS.list(filters),
                filters.to_filters(),
                Some(Order::asc("last_name")),
            )
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Contact>> {
        self.repo.get(id).await
    }

    pub async fn by_organization(&self, organization_id: Uuid) -> Result<Arc<Vec<Contact>>> {
        self.repo
            .list_where(
                CONTACTS.relation(BY_ORGANIZATION, organization_id),
                vec![Filter::eq("organization_id", organization_id.to_string())],
                Some(Order::asc("last_name")),
            )
            .await
    }

    /// The organization's primary contact, if one is flagged.
    pub async fn primary_for(&self, organization_id: Uuid) -> Result<Option<Contact>> {
        let contacts = self
            .repo
            .list_where(
                CONTACTS.relation(PRIMARY, organization_id),
                vec![
                    Filter::eq("organization_id", organization_id.to_string()),
                    Filter::eq("is_primary_contact", true),
                ],
                None,
            )
            .await?;
        Ok(contacts.first().cloned())
    }

    pub async fn create(&self, input: &ContactInput) -> Result<Contact> {
        if !input.is_primary_contact {
            return self.repo.create(input).await;
        }
        input.validate()?;
        self.clear_primary(input.organization_id, None).await?;
        self.repo.create(input).await
    }

    pub async fn update(&self, id: Uuid, patch: &ContactPatch) -> Result<Contact> {
        if patch.is_primary_contact == Some(true) {
            patch.validate()?;
            let organization_id = match patch.organization_id {
                Some(org) => org,
                None => self.repo.load(id).await?.organization_id,
            };
            self.clear_primary(organization_id, Some(id)).await?;
        }
        self.repo.update(id, patch).await
    }

    pub async fn soft_delete(&self, id: Uuid) -> Result<()> {
        self.repo.soft_delete(id).await
    }

    /// Makes `id` the only primary contact of its organization: clears the
    /// flag everywhere else first, then sets it on the target. The two steps
    /// are separate writes.
    pub async fn set_primary(&self, id: Uuid) -> Result<Contact> {
        let contact = self.repo.load(id).await?;
        let cleared = self.clear_primary(contact.organization_id, Some(id)).await?;

        let mut values = Map::new();
        values.insert("is_primary_contact".into(), Value::Bool(true));
        let updated = self
            .repo
            .update_where(vec![Filter::id(id)], values)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CrmError::NotFound {
                entity: "contact".to_string(),
                id: id.to_string(),
            })?;

        log::info!(
            "Contact {} is now primary for organization {} ({} cleared)",
            id,
            contact.organization_id,
            cleared
        );
        Ok(updated)
    }

    /// Clears the primary flag on the organization's contacts except `keep`.
    async fn clear_primary(&self, organization_id: Uuid, keep: Option<Uuid>) -> Result<usize> {
        let mut filters = vec![
            Filter::eq("organization_id", organization_id.to_string()),
            Filter::eq("is_primary_contact", true),
        ];
        if let Some(keep) = keep {
            filters.push(Filter::neq("id", keep.to_string()));
        }

        let mut values = Map::new();
        values.insert("is_primary_contact".into(), Value::Bool(false));
        Ok(self.repo.update_where(filters, values).await?.len())
    }

    /// Creates a contact, resolving or creating its organization first, then
    /// links preferred principals.
    ///
    /// Principal links are best effort: a failed link does not undo the
    /// contact. Failures are logged, returned in the result and raised as a
    /// warning toast.
    pub async fn create_with_organization(
        &self,
        request: ContactWithOrganization,
    ) -> Result<ContactCreation> {
        let ctx = self.repo.context();
        request.contact.validate()?;
        ctx.require_user().await?;

        let (organization_id, organization) = match &request.organization {
            OrganizationChoice::Existing(id) => (*id, None),
            OrganizationChoice::Named {
                name,
                organization_type,
            } => {
                let org = ctx
                    .organizations()
                    .find_or_create(name, *organization_type)
                    .await?;
                (org.id, Some(org))
            }
        };

        let mut input = request.contact;
        input.organization_id = organization_id;
        let contact = self.create(&input).await?;

        let principals = ctx.preferred_principals();
        let mut linked = Vec::new();
        let mut failed = Vec::new();
        for preference in request.preferred_principals {
            match principals.link(contact.id, preference).await {
                Ok(link) => linked.push(link),
                Err(error) => {
                    log::warn!(
                        "Contact {} created but principal {} could not be linked: {}",
                        contact.id,
                        preference.principal_organization_id,
                        error
                    );
                    failed.push(PrincipalLinkFailure {
                        principal_organization_id: preference.principal_organization_id,
                        error,
                    });
                }
            }
        }

        if !failed.is_empty() {
            ctx.notifier().notify(Toast::warning(
                "Contact created with missing relationships",
                format!(
                    "{} of {} preferred principals could not be linked.",
                    failed.len(),
                    failed.len() + linked.len()
                ),
            ));
        }

        Ok(ContactCreation {
            contact,
            organization,
            preferred_principals: linked,
            failed_principals: failed,
        })
    }
}
