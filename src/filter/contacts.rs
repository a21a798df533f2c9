use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fields::{self, FilterField, FilterValue, SelectOption};
use super::sort::{sort_records, SortDirection};
use super::{matches_search, FilterSet, TimeWindow};
use crate::error::{CrmError, Result};
use crate::models::{Contact, DecisionAuthority, Organization, PurchaseInfluence};

/// Named presets for the contacts table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuickView {
    All,
    DecisionMakers,
    HighInfluence,
    PrimaryContacts,
    /// No interaction logged in the last 30 days.
    NeedsFollowUp,
    RecentlyAdded,
}

impl QuickView {
    pub const ALL: [QuickView; 6] = [
        Self::All,
        Self::DecisionMakers,
        Self::HighInfluence,
        Self::PrimaryContacts,
        Self::NeedsFollowUp,
        Self::RecentlyAdded,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "All contacts",
            Self::DecisionMakers => "Decision makers",
            Self::HighInfluence => "High influence",
            Self::PrimaryContacts => "Primary contacts",
            Self::NeedsFollowUp => "Needs follow-up",
            Self::RecentlyAdded => "Recently added",
        }
    }
}

/// Everything the contacts filter bar can set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactFilterState {
    pub search: String,
    pub organization_id: Option<Uuid>,
    pub purchase_influence: Option<PurchaseInfluence>,
    pub decision_authority: Option<DecisionAuthority>,
    pub primary_only: bool,
    pub has_email: bool,
    pub last_interaction: Option<TimeWindow>,
    pub created: Option<TimeWindow>,
    /// The preset last applied; informational only.
    pub quick_view: Option<QuickView>,
}

const INFLUENCE: [PurchaseInfluence; 4] = [
    PurchaseInfluence::High,
    PurchaseInfluence::Medium,
    PurchaseInfluence::Low,
    PurchaseInfluence::Unknown,
];

const AUTHORITY: [DecisionAuthority; 4] = [
    DecisionAuthority::DecisionMaker,
    DecisionAuthority::Influencer,
    DecisionAuthority::EndUser,
    DecisionAuthority::Gatekeeper,
];

impl ContactFilterState {
    /// Filter-bar controls; organization options come from the resident list.
    pub fn fields(organizations: &[Organization]) -> Vec<FilterField> {
        vec![
            fields::text("search", "Search", "Name, title, email, organization or phone"),
            fields::select(
                "organization",
                "Organization",
                organizations
                    .iter()
                    .map(|o| SelectOption::new(o.id.to_string(), o.name.clone()))
                    .collect(),
            ),
            fields::select(
                "purchase_influence",
                "Purchase influence",
                INFLUENCE
                    .iter()
                    .map(|l| SelectOption::new(l.as_str(), l.as_str()))
                    .collect(),
            ),
            fields::select(
                "decision_authority",
                "Decision authority",
                AUTHORITY
                    .iter()
                    .map(|r| SelectOption::new(r.as_str(), r.as_str().replace('_', " ")))
                    .collect(),
            ),
            fields::switch("primary_only", "Primary contacts only"),
            fields::switch("has_email", "Has email"),
            fields::date_range("last_interaction", "Last interaction"),
            fields::date_range("created", "Added"),
        ]
    }

    /// Applies one control's value after checking it against `fields`.
    pub fn set(&mut self, fields: &[FilterField], key: &str, value: FilterValue) -> Result<()> {
        fields::field(fields, key)?.accepts(&value)?;

        match (key, value) {
            ("search", FilterValue::Text(text)) => self.search = text,
            ("search", FilterValue::Clear) => self.search.clear(),
            ("organization", FilterValue::Select(id)) => {
                self.organization_id = Some(
                    Uuid::parse_str(&id)
                        .map_err(|_| CrmError::validation("organization", "not an id"))?,
                )
            }
            ("organization", FilterValue::Clear) => self.organization_id = None,
            ("purchase_influence", FilterValue::Select(v)) => {
                self.purchase_influence = INFLUENCE.into_iter().find(|l| l.as_str() == v)
            }
            ("purchase_influence", FilterValue::Clear) => self.purchase_influence = None,
            ("decision_authority", FilterValue::Select(v)) => {
                self.decision_authority = AUTHORITY.into_iter().find(|r| r.as_str() == v)
            }
            ("decision_authority", FilterValue::Clear) => self.decision_authority = None,
            ("primary_only", FilterValue::Switch(on)) => self.primary_only = on,
            ("primary_only", FilterValue::Clear) => self.primary_only = false,
            ("has_email", FilterValue::Switch(on)) => self.has_email = on,
            ("has_email", FilterValue::Clear) => self.has_email = false,
            ("last_interaction", FilterValue::Window(w)) => self.last_interaction = Some(w),
            ("last_interaction", FilterValue::Clear) => self.last_interaction = None,
            ("created", FilterValue::Window(w)) => self.created = Some(w),
            ("created", FilterValue::Clear) => self.created = None,
            (key, _) => return Err(CrmError::validation(key, "unsupported value")),
        }
        Ok(())
    }

    /// Replaces the structured filters with the preset's; the search text
    /// is kept.
    pub fn apply_quick_view(&mut self, view: QuickView) {
        let search = std::mem::take(&mut self.search);
        *self = Self {
            search,
            quick_view: Some(view),
            ..Self::default()
        };
        match view {
            QuickView::All => {}
            QuickView::DecisionMakers => {
                self.decision_authority = Some(DecisionAuthority::DecisionMaker)
            }
            QuickView::HighInfluence => self.purchase_influence = Some(PurchaseInfluence::High),
            QuickView::PrimaryContacts => self.primary_only = true,
            QuickView::NeedsFollowUp => self.last_interaction = Some(TimeWindow::Over30DaysAgo),
            QuickView::RecentlyAdded => self.created = Some(TimeWindow::Last7Days),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Number of active structured filters, search included.
    pub fn active_count(&self) -> usize {
        [
            !self.search.trim().is_empty(),
            self.organization_id.is_some(),
            self.purchase_influence.is_some(),
            self.decision_authority.is_some(),
            self.primary_only,
            self.has_email,
            self.last_interaction.is_some(),
            self.created.is_some(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }

    pub fn predicates(&self, now: DateTime<Utc>) -> FilterSet<Contact> {
        let search = self.search.clone();
        let organization_id = self.organization_id;
        let influence = self.purchase_influence;
        let authority = self.decision_authority;
        let last_interaction = self.last_interaction;
        let created = self.created;

        FilterSet::new()
            .and_if(!search.trim().is_empty(), "search", move |c: &Contact| {
                matches_search(
                    &search,
                    &[
                        Some(c.first_name.as_str()),
                        Some(c.last_name.as_str()),
                        c.title.as_deref(),
                        c.email.as_deref(),
                        c.organization_name(),
                        c.phone.as_deref(),
                        c.mobile_phone.as_deref(),
                    ],
                )
            })
            .and_if(organization_id.is_some(), "organization", move |c| {
                Some(c.organization_id) == organization_id
            })
            .and_if(influence.is_some(), "purchase_influence", move |c| {
                Some(c.purchase_influence) == influence
            })
            .and_if(authority.is_some(), "decision_authority", move |c| {
                c.decision_authority == authority
            })
            .and_if(self.primary_only, "primary_only", |c| c.is_primary_contact)
            .and_if(self.has_email, "has_email", |c| {
                c.email.as_deref().is_some_and(|e| !e.trim().is_empty())
            })
            .and_if(last_interaction.is_some(), "last_interaction", move |c| {
                last_interaction.is_some_and(|w| w.contains(c.last_interaction_at, now))
            })
            .and_if(created.is_some(), "created", move |c| {
                created.is_some_and(|w| w.contains(Some(c.audit.created_at), now))
            })
    }

    pub fn filter<'a>(&self, contacts: &'a [Contact], now: DateTime<Utc>) -> Vec<&'a Contact> {
        self.predicates(now).apply(contacts)
    }
}

/// Sortable columns of the contacts table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContactSort {
    Name,
    Organization,
    PurchaseInfluence,
    LastInteraction,
    CreatedAt,
}

impl ContactSort {
    pub fn sort(self, contacts: &mut [Contact], direction: SortDirection) {
        match self {
            Self::Name => sort_records(contacts, direction, |c| {
                Some((c.last_name.to_lowercase(), c.first_name.to_lowercase()))
            }),
            Self::Organization => {
                sort_records(contacts, direction, |c| c.organization_name().map(str::to_lowercase))
            }
            Self::PurchaseInfluence => sort_records(contacts, direction, |c| {
                // High first when ascending
                match c.purchase_influence {
                    PurchaseInfluence::High => Some(0),
                    PurchaseInfluence::Medium => Some(1),
                    PurchaseInfluence::Low => Some(2),
                    PurchaseInfluence::Unknown => None,
                }
            }),
            Self::LastInteraction => sort_records(contacts, direction, |c| c.last_interaction_at),
            Self::CreatedAt => sort_records(contacts, direction, |c| Some(c.audit.created_at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Audit;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn contact(first: &str, last: &str, org: Uuid) -> Contact {
        Contact {
            id: Uuid::new_v4(),
            first_name: first.into(),
            last_name: last.into(),
            title: None,
            email: None,
            phone: None,
            mobile_phone: None,
            organization_id: org,
            purchase_influence: PurchaseInfluence::Unknown,
            decision_authority: None,
            is_primary_contact: false,
            last_interaction_at: None,
            notes: None,
            audit: Audit::new(Uuid::new_v4(), now() - Duration::days(60)),
            organization: None,
        }
    }

    fn sample() -> Vec<Contact> {
        let org = Uuid::new_v4();
        let mut john = contact("John", "Smith", org);
        john.purchase_influence = PurchaseInfluence::High;
        john.decision_authority = Some(DecisionAuthority::DecisionMaker);
        john.is_primary_contact = true;
        john.email = Some("john@acme.test".into());
        john.last_interaction_at = Some(now() - Duration::days(2));

        let mut jane = contact("Jane", "Doe", org);
        jane.purchase_influence = PurchaseInfluence::High;
        jane.audit.created_at = now() - Duration::days(3);

        let bob = contact("Bob", "Johnson", Uuid::new_v4());
        vec![john, jane, bob]
    }

    fn names(found: &[&Contact]) -> Vec<String> {
        found.iter().map(|c| c.full_name()).collect()
    }

    #[test]
    fn search_ignores_case() {
        let contacts = sample();
        let mut upper = ContactFilterState::default();
        upper.search = "JOHN".into();
        let mut lower = upper.clone();
        lower.search = "john".into();

        let a = upper.filter(&contacts, now());
        assert_eq!(names(&a), vec!["John Smith", "Bob Johnson"]);
        assert_eq!(a, lower.filter(&contacts, now()));
    }

    #[test]
    fn every_active_filter_narrows_the_result() {
        let contacts = sample();
        let mut state = ContactFilterState {
            purchase_influence: Some(PurchaseInfluence::High),
            ..Default::default()
        };
        let high = state.filter(&contacts, now());
        assert_eq!(high.len(), 2);

        state.primary_only = true;
        let both = state.filter(&contacts, now());
        assert_eq!(names(&both), vec!["John Smith"]);
        assert!(both.iter().all(|c| high.contains(c)));
        assert_eq!(state.active_count(), 2);

        state.clear();
        assert_eq!(state.filter(&contacts, now()).len(), 3);
    }

    #[test]
    fn quick_views_replace_filters_but_keep_search() {
        let contacts = sample();
        let mut state = ContactFilterState {
            search: "j".into(),
            has_email: true,
            ..Default::default()
        };

        state.apply_quick_view(QuickView::NeedsFollowUp);
        assert!(!state.has_email);
        assert_eq!(state.search, "j");
        assert_eq!(names(&state.filter(&contacts, now())), vec!["Jane Doe", "Bob Johnson"]);

        state.apply_quick_view(QuickView::RecentlyAdded);
        assert_eq!(names(&state.filter(&contacts, now())), vec!["Jane Doe"]);

        state.apply_quick_view(QuickView::DecisionMakers);
        assert_eq!(names(&state.filter(&contacts, now())), vec!["John Smith"]);
    }

    #[test]
    fn set_checks_values_against_fields() {
        let fields = ContactFilterState::fields(&[]);
        let mut state = ContactFilterState::default();

        state
            .set(&fields, "decision_authority", FilterValue::Select("gatekeeper".into()))
            .unwrap();
        assert_eq!(state.decision_authority, Some(DecisionAuthority::Gatekeeper));

        assert!(state
            .set(&fields, "decision_authority", FilterValue::Select("boss".into()))
            .is_err());
        assert!(state.set(&fields, "has_email", FilterValue::Text("yes".into())).is_err());
        assert!(state.set(&fields, "nope", FilterValue::Clear).is_err());

        state.set(&fields, "decision_authority", FilterValue::Clear).unwrap();
        assert_eq!(state.active_count(), 0);
    }

    #[test]
    fn sorting_by_last_interaction_puts_missing_dates_last() {
        let mut contacts = sample();
        ContactSort::LastInteraction.sort(&mut contacts, SortDirection::Desc);
        assert_eq!(contacts[0].first_name, "John");

        ContactSort::Name.sort(&mut contacts, SortDirection::Asc);
        let order: Vec<_> = contacts.iter().map(|c| c.last_name.as_str()).collect();
        assert_eq!(order, vec!["Doe", "Johnson", "Smith"]);
    }
}
