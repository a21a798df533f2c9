use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Hierarchical identifier for a cached read.
///
/// Keys compare segment by segment; invalidating a key also invalidates every
/// key it is a prefix of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn push(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Builds the key tree for one entity type:
/// `all → lists → list(filters)`, `all → details → detail(id)`,
/// `all → <relation> → id`.
#[derive(Debug, Clone, Copy)]
pub struct KeyFactory {
    root: &'static str,
}

impl KeyFactory {
    pub const fn new(root: &'static str) -> Self {
        Self { root }
    }

    pub fn all(&self) -> QueryKey {
        QueryKey::new([self.root])
    }

    pub fn lists(&self) -> QueryKey {
        self.all().push("list")
    }

    /// Filters are folded into the key as compact JSON so equal filter
    /// values share one cache entry.
    pub fn list<F: Serialize>(&self, filters: &F) -> QueryKey {
        let encoded = serde_json::to_string(filters).unwrap_or_else(|_| "{}".to_string());
        self.lists().push(encoded)
    }

    pub fn details(&self) -> QueryKey {
        self.all().push("detail")
    }

    pub fn detail(&self, id: Uuid) -> QueryKey {
        self.details().push(id.to_string())
    }

    pub fn relation(&self, relation: &str, id: Uuid) -> QueryKey {
        self.all().push(relation).push(id.to_string())
    }
}

pub const CONTACTS: KeyFactory = KeyFactory::new("contacts");
pub const ORGANIZATIONS: KeyFactory = KeyFactory::new("organizations");
pub const INTERACTIONS: KeyFactory = KeyFactory::new("interactions");
pub const OPPORTUNITIES: KeyFactory = KeyFactory::new("opportunities");
pub const PREFERRED_PRINCIPALS: KeyFactory = KeyFactory::new("preferred-principals");

pub const BY_ORGANIZATION: &str = "by-organization";
pub const BY_CONTACT: &str = "by-contact";
pub const BY_OPPORTUNITY: &str = "by-opportunity";
pub const PRIMARY: &str = "primary";
