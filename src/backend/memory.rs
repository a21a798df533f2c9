use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{AuthUser, Backend, Embed, Filter, Select};
use crate::error::{CrmError, Result};

/// In-process backend with the same filter semantics as the REST one.
///
/// Used for tests and offline work. Failures can be injected per row or per
/// table to exercise partial-failure paths.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Map<String, Value>>>,
    user: Option<AuthUser>,
    failing_rows: HashSet<Uuid>,
    failing_tables: HashSet<String>,
    failing_selects: u32,
    select_calls: usize,
    write_calls: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend with a signed-in user.
    pub fn signed_in(user_id: Uuid) -> Self {
        let backend = Self::new();
        backend.sign_in(user_id);
        backend
    }

    pub fn sign_in(&self, user_id: Uuid) {
        self.state.lock().user = Some(AuthUser {
            id: user_id,
            email: None,
        });
    }

    pub fn sign_out(&self) {
        self.state.lock().user = None;
    }

    /// Stores a row as-is, bypassing audit handling.
    pub fn seed(&self, table: &str, row: Value) {
        if let Value::Object(row) = row {
            self.state
                .lock()
                .tables
                .entry(table.to_string())
                .or_default()
                .push(row);
        }
    }

    /// Every row of `table`, including soft-deleted ones.
    pub fn raw_rows(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Writes touching this row id will fail.
    pub fn fail_writes_for(&self, id: Uuid) {
        self.state.lock().failing_rows.insert(id);
    }

    /// Inserts into this table will fail.
    pub fn fail_inserts_into(&self, table: &str) {
        self.state.lock().failing_tables.insert(table.to_string());
    }

    /// The next `count` selects fail with a 503.
    pub fn fail_next_selects(&self, count: u32) {
        self.state.lock().failing_selects = count;
    }

    pub fn select_calls(&self) -> usize {
        self.state.lock().select_calls
    }

    pub fn write_calls(&self) -> usize {
        self.state.lock().write_calls
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn current_user(&self) -> Result<Option<AuthUser>> {
        Ok(self.state.lock().user.clone())
    }

    async fn select(&self, query: &Select) -> Result<Vec<Value>> {
        let mut state = self.state.lock();
        state.select_calls += 1;
        if state.failing_selects > 0 {
            state.failing_selects -= 1;
            return Err(CrmError::Remote {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }

        let mut rows: Vec<Map<String, Value>> = state
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .map(|row| state.embed(row.clone(), &query.embeds))
                    .filter(|row| has_inner_embeds(row, &query.embeds))
                    .filter(|row| query.filters.iter().all(|f| matches(row, f)))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows.into_iter().map(Value::Object).collect())
    }

    async fn insert(
        &self,
        table: &str,
        rows: Vec<Map<String, Value>>,
        returning: &[Embed],
    ) -> Result<Vec<Value>> {
        let mut state = self.state.lock();
        state.write_calls += 1;
        if state.failing_tables.contains(table) {
            return Err(CrmError::Remote {
                status: 403,
                message: format!("new row violates row-level security policy for table \"{}\"", table),
            });
        }

        let now = Value::String(Utc::now().to_rfc3339());
        let mut stored = Vec::with_capacity(rows.len());
        for mut row in rows {
            row.entry("id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
            row.entry("created_at").or_insert_with(|| now.clone());
            row.entry("updated_at").or_insert_with(|| now.clone());
            row.entry("deleted_at").or_insert(Value::Null);
            stored.push(row);
        }

        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(stored.iter().cloned());

        Ok(stored
            .into_iter()
            .map(|row| Value::Object(state.embed(row, returning)))
            .collect())
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        values: Map<String, Value>,
        returning: &[Embed],
    ) -> Result<Vec<Value>> {
        let mut state = self.state.lock();
        state.write_calls += 1;

        let Some(rows) = state.tables.get(table) else {
            return Ok(Vec::new());
        };
        let targets: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| filters.iter().all(|f| matches(row, f)))
            .map(|(i, _)| i)
            .collect();

        let blocked = targets.iter().any(|&i| {
            row_id(&rows[i]).is_some_and(|id| state.failing_rows.contains(&id))
        });
        if blocked {
            return Err(CrmError::Remote {
                status: 403,
                message: format!("update on \"{}\" rejected by policy", table),
            });
        }

        let mut updated = Vec::with_capacity(targets.len());
        if let Some(rows) = state.tables.get_mut(table) {
            for i in targets {
                for (k, v) in &values {
                    rows[i].insert(k.clone(), v.clone());
                }
                updated.push(rows[i].clone());
            }
        }

        Ok(updated
            .into_iter()
            .map(|row| Value::Object(state.embed(row, returning)))
            .collect())
    }
}

impl MemoryState {
    fn embed(&self, mut row: Map<String, Value>, embeds: &[Embed]) -> Map<String, Value> {
        for embed in embeds {
            let related = row
                .get(&embed.foreign_key)
                .and_then(Value::as_str)
                .and_then(|fk| {
                    self.tables.get(&embed.table).and_then(|rows| {
                        rows.iter()
                            .find(|r| r.get("id").and_then(Value::as_str) == Some(fk))
                    })
                })
                .cloned()
                .map(Value::Object)
                .unwrap_or(Value::Null);
            row.insert(embed.alias.clone(), related);
        }
        row
    }
}

fn row_id(row: &Map<String, Value>) -> Option<Uuid> {
    row.get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

static NULL: Value = Value::Null;

/// Looks up `column` in a row; `alias.column` reaches into an embedded row.
fn cell<'a>(row: &'a Map<String, Value>, column: &str) -> &'a Value {
    let mut path = column.split('.');
    let mut value = path.next().and_then(|c| row.get(c)).unwrap_or(&NULL);
    for part in path {
        value = value.get(part).unwrap_or(&NULL);
    }
    value
}

fn matches(row: &Map<String, Value>, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(col, v) => values_equal(cell(row, col), v),
        Filter::Neq(col, v) => !cell(row, col).is_null() && !values_equal(cell(row, col), v),
        Filter::In(col, vs) => vs.iter().any(|v| values_equal(cell(row, col), v)),
        Filter::IsNull(col) => cell(row, col).is_null(),
        Filter::ILike(col, pattern) => cell(row, col)
            .as_str()
            .is_some_and(|s| like_regex(pattern).is_some_and(|re| re.is_match(s))),
        Filter::Or(inner) => inner.iter().any(|f| matches(row, f)),
    }
}

/// Compares as the database would after casting the operand to the column type.
fn values_equal(cell: &Value, operand: &Value) -> bool {
    match (cell, operand) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::String(a), other) | (other, Value::String(a)) => *a == other.to_string(),
        (a, b) => a == b,
    }
}

/// Case-insensitive regex for an SQL `LIKE` pattern: `%` is any run, `_` one
/// character, and a backslash makes the next character literal.
fn like_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(next.encode_utf8(&mut [0; 4])));
                }
            }
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    RegexBuilder::new(&re)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .ok()
}

fn has_inner_embeds(row: &Map<String, Value>, embeds: &[Embed]) -> bool {
    embeds
        .iter()
        .filter(|e| e.inner)
        .all(|e| row.get(&e.alias).is_some_and(|v| !v.is_null()))
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        // nulls last
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Order;
    use serde_json::json;

    fn org(name: &str) -> Value {
        json!({ "id": Uuid::new_v4().to_string(), "name": name, "deleted_at": null })
    }

    fn like(text: &str, pattern: &str) -> bool {
        like_regex(pattern).is_some_and(|re| re.is_match(text))
    }

    #[test]
    fn like_patterns() {
        assert!(like("John Smith", "%smi%"));
        assert!(like("john", "j_hn"));
        assert!(like("john", "%"));
        assert!(!like("john", "%x%"));
        assert!(like("", "%%"));
        assert!(like("50% off", "50\\% off"));
        assert!(!like("500 off", "50\\% off"));
        assert!(!like("a.c", "abc") && !like("abc", "a.c"));
    }

    #[tokio::test]
    async fn select_skips_soft_deleted_rows() {
        let backend = MemoryBackend::new();
        backend.seed("organizations", org("Acme"));
        backend.seed(
            "organizations",
            json!({ "id": Uuid::new_v4().to_string(), "name": "Gone", "deleted_at": "2024-01-01T00:00:00Z" }),
        );

        let rows = backend.select(&Select::from("organizations")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Acme");
        assert_eq!(backend.raw_rows("organizations").len(), 2);
    }

    #[tokio::test]
    async fn search_or_and_ordering() {
        let backend = MemoryBackend::new();
        backend.seed("organizations", org("Zeta Foods"));
        backend.seed("organizations", org("acme pantry"));
        backend.seed("organizations", org("Bistro"));

        let query = Select::from("organizations")
            .filter(Filter::search(&["name"], "A"))
            .order(Order::asc("name"));
        let names: Vec<_> = backend
            .select(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["acme pantry", "Zeta Foods"]);
    }

    #[tokio::test]
    async fn update_is_rejected_for_failing_rows() {
        let backend = MemoryBackend::new();
        let id = Uuid::new_v4();
        backend.seed("contacts", json!({ "id": id.to_string(), "deleted_at": null }));
        backend.fail_writes_for(id);

        let mut values = Map::new();
        values.insert("deleted_at".into(), json!("2024-01-01T00:00:00Z"));
        let err = backend
            .update("contacts", &[Filter::id(id)], values, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Remote { status: 403, .. }));
        assert!(backend.raw_rows("contacts")[0]["deleted_at"].is_null());
    }
}
