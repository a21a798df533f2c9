//! Narrowing of already-fetched rows.
//!
//! Nothing here talks to the backend: filters run over whatever list is
//! resident in the cache. Every active field contributes one predicate and a
//! row passes only when all of them pass.

pub mod contacts;
pub mod fields;
pub mod interactions;
pub mod organizations;
pub mod sort;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use contacts::{ContactFilterState, ContactSort, QuickView};
pub use fields::{FilterField, FilterValue, SelectOption};
pub use interactions::InteractionFilterState;
pub use organizations::OrganizationFilterState;
pub use sort::SortDirection;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Conjunction of named predicates.
pub struct FilterSet<T> {
    predicates: Vec<(&'static str, Predicate<T>)>,
}

impl<T> Default for FilterSet<T> {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }
}

impl<T> FilterSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, name: &'static str, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push((name, Box::new(predicate)));
        self
    }

    /// Adds the predicate only when `condition` holds.
    pub fn and_if(
        self,
        condition: bool,
        name: &'static str,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        if condition {
            self.and(name, predicate)
        } else {
            self
        }
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.predicates.iter().map(|(n, _)| *n).collect()
    }

    pub fn matches(&self, item: &T) -> bool {
        self.predicates.iter().all(|(_, p)| p(item))
    }

    pub fn apply<'a>(&self, items: &'a [T]) -> Vec<&'a T> {
        items.iter().filter(|item| self.matches(item)).collect()
    }
}

/// Case-insensitive substring match of `query` against any of `fields`.
/// A blank query matches everything.
pub fn matches_search(query: &str, fields: &[Option<&str>]) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    fields
        .iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Relative window over a timestamp column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Today,
    Last7Days,
    Last30Days,
    Last90Days,
    /// Older than 30 days, or never set.
    Over30DaysAgo,
    Never,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 6] = [
        Self::Today,
        Self::Last7Days,
        Self::Last30Days,
        Self::Last90Days,
        Self::Over30DaysAgo,
        Self::Never,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Last7Days => "last_7_days",
            Self::Last30Days => "last_30_days",
            Self::Last90Days => "last_90_days",
            Self::Over30DaysAgo => "over_30_days_ago",
            Self::Never => "never",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Last7Days => "Last 7 days",
            Self::Last30Days => "Last 30 days",
            Self::Last90Days => "Last 90 days",
            Self::Over30DaysAgo => "More than 30 days ago",
            Self::Never => "Never",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.as_str() == value)
    }

    pub fn contains(&self, at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let within = |days: i64| at.is_some_and(|t| t <= now && now - t <= Duration::days(days));
        match self {
            Self::Today => at.is_some_and(|t| t.date_naive() == now.date_naive()),
            Self::Last7Days => within(7),
            Self::Last30Days => within(30),
            Self::Last90Days => within(90),
            Self::Over30DaysAgo => at.map_or(true, |t| now - t > Duration::days(30)),
            Self::Never => at.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn blank_search_matches_everything() {
        assert!(matches_search("  ", &[None]));
        assert!(matches_search("SMI", &[Some("John Smith")]));
        assert!(!matches_search("x", &[Some("abc"), None]));
    }

    #[test]
    fn filter_set_is_a_conjunction() {
        let set = FilterSet::<u32>::new()
            .and("even", |n| n % 2 == 0)
            .and_if(true, "big", |n| *n > 10)
            .and_if(false, "never", |_| false);

        assert_eq!(set.names(), vec!["even", "big"]);
        let items = [2, 12, 13, 40];
        assert_eq!(set.apply(&items), vec![&12, &40]);
    }

    #[test]
    fn time_windows() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
        let days_ago = |d: i64| Some(now - Duration::days(d));

        assert!(TimeWindow::Today.contains(Some(now - Duration::hours(2)), now));
        assert!(TimeWindow::Last7Days.contains(days_ago(6), now));
        assert!(!TimeWindow::Last7Days.contains(days_ago(8), now));
        assert!(TimeWindow::Over30DaysAgo.contains(days_ago(31), now));
        assert!(TimeWindow::Over30DaysAgo.contains(None, now));
        assert!(!TimeWindow::Over30DaysAgo.contains(days_ago(3), now));
        assert!(TimeWindow::Never.contains(None, now));
        assert_eq!(TimeWindow::parse("last_90_days"), Some(TimeWindow::Last90Days));
    }
}
