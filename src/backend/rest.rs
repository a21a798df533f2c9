use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{AuthUser, Backend, Embed, Filter, Select};
use crate::config::AppConfig;
use crate::error::{CrmError, Result};

/// Backend speaking the PostgREST dialect used by hosted Postgres services.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

/// Error body returned by PostgREST and the auth service.
#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl RestBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        if config.backend_url.is_empty() {
            return Err(CrmError::Config(
                "Backend URL not configured. Set CRM_BACKEND_URL or edit config.json.".to_string(),
            ));
        }
        if config.api_key.is_empty() {
            return Err(CrmError::Config(
                "API key not configured. Set CRM_API_KEY or edit config.json.".to_string(),
            ));
        }
        Ok(Self::new(
            config.backend_url.clone(),
            config.api_key.clone(),
            config.access_token.clone(),
        ))
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    async fn rows(response: Response) -> Result<Vec<Value>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Remote {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| CrmError::Decode(format!("Failed to parse rows: {}", e)))
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn current_user(&self) -> Result<Option<AuthUser>> {
        let Some(token) = &self.access_token else {
            return Ok(None);
        };

        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| CrmError::Network(format!("Auth request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            log::debug!("Session rejected by auth service ({})", status);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Remote {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| CrmError::Decode(format!("Failed to parse user: {}", e)))?;
        Ok(Some(user))
    }

    async fn select(&self, query: &Select) -> Result<Vec<Value>> {
        let mut params = vec![("select".to_string(), select_clause(&query.embeds))];
        params.extend(query.filters.iter().map(filter_param));
        if let Some(order) = &query.order {
            let dir = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        log::debug!("GET {} ({} filters)", query.table, query.filters.len());

        let response = self
            .authorized(self.client.get(self.table_url(&query.table)))
            .query(&params)
            .send()
            .await
            .map_err(|e| CrmError::Network(format!("Select on {} failed: {}", query.table, e)))?;

        Self::rows(response).await
    }

    async fn insert(
        &self,
        table: &str,
        rows: Vec<Map<String, Value>>,
        returning: &[Embed],
    ) -> Result<Vec<Value>> {
        log::debug!("POST {} ({} rows)", table, rows.len());

        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .query(&[("select", select_clause(returning))])
            .json(&rows)
            .send()
            .await
            .map_err(|e| CrmError::Network(format!("Insert into {} failed: {}", table, e)))?;

        Self::rows(response).await
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        values: Map<String, Value>,
        returning: &[Embed],
    ) -> Result<Vec<Value>> {
        let mut params = vec![("select".to_string(), select_clause(returning))];
        params.extend(filters.iter().map(filter_param));

        log::debug!("PATCH {} ({} filters)", table, filters.len());

        let response = self
            .authorized(self.client.patch(self.table_url(table)))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .query(&params)
            .json(&values)
            .send()
            .await
            .map_err(|e| CrmError::Network(format!("Update of {} failed: {}", table, e)))?;

        Self::rows(response).await
    }
}

/// `*,alias:table!fk(*)` for each embed, with `!inner` on inner joins.
fn select_clause(embeds: &[Embed]) -> String {
    let mut clause = String::from("*");
    for embed in embeds {
        let join = if embed.inner { "!inner" } else { "" };
        clause.push_str(&format!(
            ",{}:{}!{}{}(*)",
            embed.alias, embed.table, embed.foreign_key, join
        ));
    }
    clause
}

fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Or(inner) => ("or".to_string(), format!("({})", or_terms(inner))),
        Filter::Eq(col, _)
        | Filter::Neq(col, _)
        | Filter::In(col, _)
        | Filter::IsNull(col)
        | Filter::ILike(col, _) => (col.clone(), operator(filter)),
    }
}

fn or_terms(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(|f| match f {
            Filter::Or(inner) => format!("or({})", or_terms(inner)),
            Filter::Eq(col, _)
            | Filter::Neq(col, _)
            | Filter::In(col, _)
            | Filter::IsNull(col)
            | Filter::ILike(col, _) => format!("{}.{}", col, quoted_operator(f)),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Operator and operand for a top-level query parameter.
fn operator(filter: &Filter) -> String {
    match filter {
        Filter::Eq(_, v) => format!("eq.{}", literal(v)),
        Filter::Neq(_, v) => format!("neq.{}", literal(v)),
        Filter::In(_, vs) => format!(
            "in.({})",
            vs.iter().map(|v| quote(&literal(v))).collect::<Vec<_>>().join(",")
        ),
        Filter::IsNull(_) => "is.null".to_string(),
        Filter::ILike(_, pattern) => format!("ilike.{}", url_pattern(pattern)),
        Filter::Or(_) => String::new(),
    }
}

/// Inside `or=(...)` operands containing reserved characters must be quoted.
fn quoted_operator(filter: &Filter) -> String {
    match filter {
        Filter::Eq(_, v) => format!("eq.{}", quote(&literal(v))),
        Filter::Neq(_, v) => format!("neq.{}", quote(&literal(v))),
        Filter::ILike(_, pattern) => format!("ilike.{}", quote(&url_pattern(pattern))),
        _ => operator(filter),
    }
}

/// PostgREST spells the `%` wildcard as `*` in URLs; escaped characters
/// pass through untouched.
fn url_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                out.extend(chars.next());
            }
            '%' => out.push('*'),
            other => out.push(other),
        }
    }
    out
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn quote(raw: &str) -> String {
    if raw.contains([',', '(', ')', ':', '"', '\\']) {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        raw.to_string()
    }
}

/// Pulls the most readable message out of an error body.
fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<RemoteErrorBody>(body) {
        Ok(err) => {
            let main = err
                .message
                .or(err.msg)
                .or(err.error_description)
                .unwrap_or_default();
            let extra = err.details.or(err.hint);
            match extra {
                Some(extra) if !main.is_empty() => format!("{} ({})", main, extra),
                Some(extra) => extra,
                None if main.is_empty() => body.trim().to_string(),
                None => main,
            }
        }
        Err(_) => body.trim().to_string(),
    }
}
