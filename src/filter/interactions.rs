use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{matches_search, FilterSet, TimeWindow};
use crate::models::{Interaction, InteractionType};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InteractionFilterState {
    pub search: String,
    pub types: Vec<InteractionType>,
    pub contact_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub follow_up_only: bool,
    pub overdue_only: bool,
    pub date: Option<TimeWindow>,
}

impl InteractionFilterState {
    pub fn predicates(&self, now: DateTime<Utc>) -> FilterSet<Interaction> {
        let search = self.search.clone();
        let types = self.types.clone();
        let contact_id = self.contact_id;
        let organization_id = self.organization_id;
        let date = self.date;
        let today = now.date_naive();

        FilterSet::new()
            .and_if(!search.trim().is_empty(), "search", move |i: &Interaction| {
                let contact_name = i.contact.as_ref().map(|c| c.full_name());
                matches_search(
                    &search,
                    &[
                        Some(i.subject.as_str()),
                        i.description.as_deref(),
                        contact_name.as_deref(),
                        i.organization.as_ref().map(|o| o.name.as_str()),
                    ],
                )
            })
            .and_if(!types.is_empty(), "type", move |i| types.contains(&i.interaction_type))
            .and_if(contact_id.is_some(), "contact", move |i| i.contact_id == contact_id)
            .and_if(organization_id.is_some(), "organization", move |i| {
                i.organization_id == organization_id
            })
            .and_if(self.follow_up_only, "follow_up", |i| i.follow_up_required)
            .and_if(self.overdue_only, "overdue", move |i| i.is_follow_up_overdue(today))
            .and_if(date.is_some(), "date", move |i| {
                date.is_some_and(|w| w.contains(Some(i.interaction_date), now))
            })
    }

    pub fn filter<'a>(
        &self,
        interactions: &'a [Interaction],
        now: DateTime<Utc>,
    ) -> Vec<&'a Interaction> {
        self.predicates(now).apply(interactions)
    }
}
