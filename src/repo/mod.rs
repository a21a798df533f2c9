//! Entity reads and writes routed through the query cache.
//!
//! Every write follows the same discipline: resolve the signed-in user,
//! stamp audit columns, write, then invalidate the keys the record can
//! appear under. The only direct cache writes are seeding the detail entry
//! after a create and evicting it after a soft delete.

pub mod contacts;
pub mod interactions;
pub mod opportunities;
pub mod organizations;
pub mod principals;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::{Filter, Order, Select, DELETED_AT};
use crate::error::{CrmError, Result};
use crate::models::{Entity, EntityInput};
use crate::query::keys::{KeyFactory, QueryKey};
use crate::CrmContext;

pub use contacts::{
    ContactCreation, ContactFilters, ContactRepository, ContactWithOrganization,
    OrganizationChoice, PrincipalLinkFailure,
};
pub use interactions::{InteractionFilters, InteractionRepository};
pub use opportunities::{OpportunityFilters, OpportunityRepository};
pub use organizations::{OrganizationFilters, OrganizationRepository};
pub use principals::PreferredPrincipalRepository;

/// Generic list/detail/create/update/soft-delete for one entity type.
pub struct Repository<E> {
    ctx: CrmContext,
    keys: KeyFactory,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            keys: self.keys,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(ctx: CrmContext, keys: KeyFactory) -> Self {
        Self {
            ctx,
            keys,
            _entity: PhantomData,
        }
    }

    pub fn keys(&self) -> KeyFactory {
        self.keys
    }

    pub fn context(&self) -> &CrmContext {
        &self.ctx
    }

    /// Cached list under `key`, matching `filters` (plus the soft-delete
    /// exclusion) with the entity's relations embedded.
    pub async fn list_where(
        &self,
        key: QueryKey,
        filters: Vec<Filter>,
        order: Option<Order>,
    ) -> Result<Arc<Vec<E>>> {
        let mut query = Select::from(E::TABLE).filters(filters).embed(E::embeds());
        if let Some(order) = order {
            query = query.order(order);
        }

        let backend = self.ctx.backend().clone();
        self.ctx
            .queries()
            .fetch(key, move || {
                let backend = backend.clone();
                let query = query.clone();
                async move {
                    let rows = backend.select(&query).await?;
                    decode_rows::<E>(rows)
                }
            })
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<E>> {
        let query = Select::from(E::TABLE)
            .filter(Filter::id(id))
            .embed(E::embeds())
            .limit(1);

        let backend = self.ctx.backend().clone();
        self.ctx
            .queries()
            .fetch(self.keys.detail(id), move || {
                let backend = backend.clone();
                let query = query.clone();
                async move {
                    let rows = backend.select(&query).await?;
                    match rows.into_iter().next() {
                        Some(row) => Ok(serde_json::from_value::<E>(row)?),
                        None => Err(not_found::<E>(id)),
                    }
                }
            })
            .await
    }

    /// Reads one live record straight from the backend, bypassing the cache.
    pub(crate) async fn load(&self, id: Uuid) -> Result<E> {
        let query = Select::from(E::TABLE).filter(Filter::id(id)).limit(1);
        let rows = self.ctx.backend().select(&query).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(serde_json::from_value(row)?),
            None => Err(not_found::<E>(id)),
        }
    }

    /// Inserts one record with audit columns, then seeds its detail entry so
    /// a detail view renders without another round trip.
    pub async fn create<I: EntityInput>(&self, input: &I) -> Result<E> {
        input.validate()?;
        let user = self.ctx.require_user().await?;

        let mut row = to_object(input)?;
        row.insert("created_by".into(), Value::String(user.id.to_string()));
        row.insert("updated_by".into(), Value::String(user.id.to_string()));

        let rows = self
            .ctx
            .backend()
            .insert(E::TABLE, vec![row], &E::embeds())
            .await?;
        let record = first_row::<E>(rows)?;

        self.invalidate_lists(input.related_keys());
        self.invalidate_lists(record.related_keys());
        self.ctx
            .queries()
            .set_data(self.keys.detail(record.id()), record.clone());

        log::info!("Created {} {}", E::NAME, record.id());
        Ok(record)
    }

    /// Applies a partial update, stamping `updated_at`/`updated_by`.
    ///
    /// A patch that moves the record to another parent also invalidates the
    /// relation views it is leaving.
    pub async fn update<P: EntityInput>(&self, id: Uuid, patch: &P) -> Result<E> {
        patch.validate()?;
        let values = to_object(patch)?;
        let previous = if E::RELATION_COLUMNS.iter().any(|c| values.contains_key(*c)) {
            Some(self.load(id).await?)
        } else {
            None
        };

        let records = self.update_where(vec![Filter::id(id)], values).await?;
        let record = records.into_iter().next().ok_or_else(|| not_found::<E>(id))?;
        if let Some(previous) = previous {
            self.invalidate_lists(previous.related_keys());
        }

        log::info!("Updated {} {}", E::NAME, id);
        Ok(record)
    }

    /// Sets `deleted_at`; the row is never physically removed.
    pub async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut values = Map::new();
        values.insert(DELETED_AT.into(), Value::String(Utc::now().to_rfc3339()));

        let records = self.update_where(vec![Filter::id(id)], values).await?;
        if records.is_empty() {
            return Err(not_found::<E>(id));
        }
        self.ctx.queries().remove(&self.keys.detail(id));

        log::info!("Soft-deleted {} {}", E::NAME, id);
        Ok(())
    }

    /// Updates every live row matching `filters` and invalidates whatever
    /// could hold them, including reads of other entities that embed them.
    /// Returns the rows as written.
    pub(crate) async fn update_where(
        &self,
        mut filters: Vec<Filter>,
        mut values: Map<String, Value>,
    ) -> Result<Vec<E>> {
        let user = self.ctx.require_user().await?;
        values.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
        values.insert("updated_by".into(), Value::String(user.id.to_string()));
        filters.push(Filter::is_null(DELETED_AT));

        let rows = self
            .ctx
            .backend()
            .update(E::TABLE, &filters, values, &E::embeds())
            .await?;
        let records = decode_rows::<E>(rows)?;

        let mut related = Vec::new();
        for record in &records {
            related.extend(record.related_keys());
            related.push(self.keys.detail(record.id()));
        }
        if !records.is_empty() {
            related.extend(E::embedded_by().iter().map(KeyFactory::all));
        }
        self.invalidate_lists(related);
        Ok(records)
    }

    /// Invalidates every list of this entity plus `extra` keys.
    pub(crate) fn invalidate_lists(&self, extra: Vec<QueryKey>) {
        let queries = self.ctx.queries();
        queries.invalidate(&self.keys.lists());
        for key in extra {
            queries.invalidate(&key);
        }
    }
}

pub(crate) fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(CrmError::Decode(format!(
            "expected an object to write, got {}",
            other
        ))),
    }
}

pub(crate) fn decode_rows<E: Entity>(rows: Vec<Value>) -> Result<Vec<E>> {
    rows.into_iter()
        .map(|row| serde_json::from_value::<E>(row).map_err(CrmError::from))
        .collect()
}

fn first_row<E: Entity>(rows: Vec<Value>) -> Result<E> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| CrmError::Decode(format!("insert into {} returned no row", E::TABLE)))?;
    Ok(serde_json::from_value(row)?)
}

fn not_found<E: Entity>(id: Uuid) -> CrmError {
    CrmError::NotFound {
        entity: E::NAME.to_string(),
        id: id.to_string(),
    }
}
