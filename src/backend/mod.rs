pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Result;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

/// Column every read excludes on.
pub const DELETED_AT: &str = "deleted_at";

/// The signed-in user as reported by the auth endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Row predicate understood by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    /// Case-insensitive pattern; `%` matches any run of characters.
    ILike(String, String),
    /// Passes when any inner filter passes.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::Eq(column.to_string(), value.into())
    }

    pub fn neq(column: &str, value: impl Into<Value>) -> Self {
        Self::Neq(column.to_string(), value.into())
    }

    pub fn id(id: Uuid) -> Self {
        Self::eq("id", id.to_string())
    }

    pub fn is_null(column: &str) -> Self {
        Self::IsNull(column.to_string())
    }

    pub fn any_of<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    /// Substring match on `column`, ignoring case. Wildcards typed by the
    /// user match literally.
    pub fn contains(column: &str, needle: &str) -> Self {
        Self::ILike(column.to_string(), format!("%{}%", escape_like(needle)))
    }

    /// Substring search across several columns. A column may name a field
    /// of an embedded relation as `alias.column`.
    pub fn search(columns: &[&str], needle: &str) -> Self {
        Self::Or(columns.iter().map(|c| Self::contains(c, needle)).collect())
    }
}

/// Backslash-escapes the `LIKE` metacharacters in `text`.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A related row pulled in alongside each result through a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub alias: String,
    pub table: String,
    pub foreign_key: String,
    /// Inner join: parent rows without the related row are dropped, and
    /// filters may reference the relation's columns.
    pub inner: bool,
}

impl Embed {
    pub fn new(alias: &str, table: &str, foreign_key: &str) -> Self {
        Self {
            alias: alias.to_string(),
            table: table.to_string(),
            foreign_key: foreign_key.to_string(),
            inner: false,
        }
    }

    pub fn inner(alias: &str, table: &str, foreign_key: &str) -> Self {
        Self {
            inner: true,
            ..Self::new(alias, table, foreign_key)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: false,
        }
    }
}

/// A read against one table. Soft-deleted rows are always excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub filters: Vec<Filter>,
    pub embeds: Vec<Embed>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filters: vec![Filter::is_null(DELETED_AT)],
            embeds: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn embed(mut self, embeds: Vec<Embed>) -> Self {
        self.embeds = embeds;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Row-level access to the remote store. Rows travel as JSON objects.
///
/// There is no delete: records are retired by setting
/// `deleted_at` through [`Backend::update`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// The authenticated user, or `None` without a session.
    async fn current_user(&self) -> Result<Option<AuthUser>>;

    async fn select(&self, query: &Select) -> Result<Vec<Value>>;

    /// Inserts rows and returns them as stored, with `returning` embedded.
    async fn insert(
        &self,
        table: &str,
        rows: Vec<Map<String, Value>>,
        returning: &[Embed],
    ) -> Result<Vec<Value>>;

    /// Applies `values` to every row matching `filters`; returns the
    /// updated rows with `returning` embedded.
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        values: Map<String, Value>,
        returning: &[Embed],
    ) -> Result<Vec<Value>>;
}
