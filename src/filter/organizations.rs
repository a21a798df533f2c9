use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{matches_search, FilterSet, TimeWindow};
use crate::models::{Organization, OrganizationPriority, OrganizationType};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrganizationFilterState {
    pub search: String,
    pub organization_type: Option<OrganizationType>,
    pub priorities: Vec<OrganizationPriority>,
    pub segment: Option<String>,
    pub principals_only: bool,
    pub distributors_only: bool,
    pub created: Option<TimeWindow>,
}

impl OrganizationFilterState {
    pub fn predicates(&self, now: DateTime<Utc>) -> FilterSet<Organization> {
        let search = self.search.clone();
        let kind = self.organization_type;
        let priorities = self.priorities.clone();
        let segment = self.segment.clone();
        let created = self.created;

        FilterSet::new()
            .and_if(!search.trim().is_empty(), "search", move |o: &Organization| {
                matches_search(
                    &search,
                    &[
                        Some(o.name.as_str()),
                        o.city.as_deref(),
                        o.segment.as_deref(),
                        o.email.as_deref(),
                        o.phone.as_deref(),
                    ],
                )
            })
            .and_if(kind.is_some(), "type", move |o| Some(o.organization_type) == kind)
            .and_if(!priorities.is_empty(), "priority", move |o| {
                o.priority.is_some_and(|p| priorities.contains(&p))
            })
            .and_if(segment.is_some(), "segment", move |o| {
                match (&o.segment, &segment) {
                    (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                    _ => false,
                }
            })
            .and_if(self.principals_only, "principals_only", |o| o.is_principal)
            .and_if(self.distributors_only, "distributors_only", |o| o.is_distributor)
            .and_if(created.is_some(), "created", move |o| {
                created.is_some_and(|w| w.contains(Some(o.audit.created_at), now))
            })
    }

    pub fn filter<'a>(
        &self,
        organizations: &'a [Organization],
        now: DateTime<Utc>,
    ) -> Vec<&'a Organization> {
        self.predicates(now).apply(organizations)
    }
}
