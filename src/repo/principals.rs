use std::sync::Arc;
use uuid::Uuid;

use super::Repository;
use crate::backend::Filter;
use crate::error::Result;
use crate::models::principal::PreferredPrincipalInput;
use crate::models::{PreferredPrincipal, PrincipalPreference};
use crate::query::keys::{BY_CONTACT, PREFERRED_PRINCIPALS};
use crate::CrmContext;

/// Contact ↔ principal organization links.
#[derive(Clone)]
pub struct PreferredPrincipalRepository {
    repo: Repository<PreferredPrincipal>,
}

impl PreferredPrincipalRepository {
    pub fn new(ctx: CrmContext) -> Self {
        Self {
            repo: Repository::new(ctx, PREFERRED_PRINCIPALS),
        }
    }

    pub async fn for_contact(&self, contact_id: Uuid) -> Result<Arc<Vec<PreferredPrincipal>>> {
        self.repo
            .list_where(
                PREFERRED_PRINCIPALS.relation(BY_CONTACT, contact_id),
                vec![Filter::eq("contact_id", contact_id.to_string())],
                None,
            )
            .await
    }

    pub async fn link(
        &self,
        contact_id: Uuid,
        preference: PrincipalPreference,
    ) -> Result<PreferredPrincipal> {
        self.repo
            .create(&PreferredPrincipalInput {
                contact_id,
                principal_organization_id: preference.principal_organization_id,
                advocacy_strength: preference.advocacy_strength,
            })
            .await
    }

    pub async fn unlink(&self, id: Uuid) -> Result<()> {
        self.repo.soft_delete(id).await
    }
}
