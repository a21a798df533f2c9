mod common;

use chrono::{Duration, Utc};
use serde_json::Value;

use kitchen_pantry_crm::models::{
    AdvocacyStrength, ContactInput, ContactPatch, InteractionInput, InteractionType,
    OrganizationPatch, OrganizationType, PrincipalPreference,
};
use kitchen_pantry_crm::notify::ToastLevel;
use kitchen_pantry_crm::query::keys::CONTACTS;
use kitchen_pantry_crm::repo::{ContactFilters, ContactWithOrganization, OrganizationChoice};
use kitchen_pantry_crm::Error;

#[tokio::test]
async fn created_contact_is_readable_without_another_fetch() {
    let h = common::signed_in();
    let org = h.organization("Blue Plate Diner").await;
    let contact = h.contact("Ada", "Lovelace", org.id).await;

    let before = h.backend.select_calls();
    let fetched = h.ctx.contacts().get(contact.id).await.unwrap();

    assert_eq!(fetched.id, contact.id);
    assert_eq!(h.backend.select_calls(), before);
}

#[tokio::test]
async fn soft_deleted_contact_leaves_lists_and_cache() {
    let h = common::signed_in();
    let org = h.organization("Blue Plate Diner").await;
    let keep = h.contact("Ada", "Lovelace", org.id).await;
    let gone = h.contact("Charles", "Babbage", org.id).await;
    let contacts = h.ctx.contacts();

    assert_eq!(contacts.list(&ContactFilters::default()).await.unwrap().len(), 2);

    contacts.soft_delete(gone.id).await.unwrap();

    let listed = contacts.list(&ContactFilters::default()).await.unwrap();
    assert_eq!(listed.iter().map(|c| c.id).collect::<Vec<_>>(), vec![keep.id]);
    assert!(!h.ctx.queries().contains(&CONTACTS.detail(gone.id)));

    let rows = h.backend.raw_rows("contacts");
    assert_eq!(rows.len(), 2);
    let deleted = rows
        .iter()
        .find(|r| r["id"] == Value::String(gone.id.to_string()))
        .unwrap();
    assert!(!deleted["deleted_at"].is_null());
}

#[tokio::test]
async fn an_organization_keeps_a_single_primary_contact() {
    let h = common::signed_in();
    let org = h.organization("Blue Plate Diner").await;
    let contacts = h.ctx.contacts();

    let mut first = ContactInput::new("Ada", "Lovelace", org.id);
    first.is_primary_contact = true;
    let a = contacts.create(&first).await.unwrap();
    let b = h.contact("Charles", "Babbage", org.id).await;

    assert_eq!(contacts.primary_for(org.id).await.unwrap().unwrap().id, a.id);

    contacts.set_primary(b.id).await.unwrap();
    let primary = contacts.primary_for(org.id).await.unwrap().unwrap();
    assert_eq!(primary.id, b.id);
    let flagged = contacts
        .by_organization(org.id)
        .await
        .unwrap()
        .iter()
        .filter(|c| c.is_primary_contact)
        .count();
    assert_eq!(flagged, 1);

    let mut third = ContactInput::new("Grace", "Hopper", org.id);
    third.is_primary_contact = true;
    let c = contacts.create(&third).await.unwrap();
    let primaries = contacts
        .list(&ContactFilters {
            primary_only: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(primaries.iter().map(|c| c.id).collect::<Vec<_>>(), vec![c.id]);
}

#[tokio::test]
async fn contact_form_creates_a_missing_organization() {
    let h = common::signed_in();
    let contacts = h.ctx.contacts();
    let request = |first: &str| ContactWithOrganization {
        contact: ContactInput::new(first, "Smith", uuid::Uuid::nil()),
        organization: OrganizationChoice::Named {
            name: "Acme".into(),
            organization_type: OrganizationType::Customer,
        },
        preferred_principals: vec![],
    };

    let created = contacts.create_with_organization(request("John")).await.unwrap();
    let org = created.organization.clone().unwrap();
    assert_eq!(org.name, "Acme");
    assert_eq!(org.organization_type, OrganizationType::Customer);
    assert_eq!(created.contact.organization_id, org.id);
    assert!(created.is_complete());

    let again = contacts.create_with_organization(request("Jane")).await.unwrap();
    assert_eq!(again.contact.organization_id, org.id);
    assert_eq!(h.backend.raw_rows("organizations").len(), 1);
}

#[tokio::test]
async fn writes_without_a_session_fail_before_touching_the_backend() {
    let h = common::signed_out();
    let contacts = h.ctx.contacts();

    let err = contacts
        .create(&ContactInput::new("Ada", "Lovelace", uuid::Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)));

    let err = contacts
        .create_with_organization(ContactWithOrganization {
            contact: ContactInput::new("Ada", "Lovelace", uuid::Uuid::nil()),
            organization: OrganizationChoice::Named {
                name: "Acme".into(),
                organization_type: OrganizationType::Customer,
            },
            preferred_principals: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
    assert_eq!(h.backend.write_calls(), 0);
}

#[tokio::test]
async fn failed_principal_links_are_reported_not_fatal() {
    let h = common::signed_in();
    let distributor = h.organization("Sysco").await;
    let principal = h.organization("Heinz").await;
    h.backend.fail_inserts_into("contact_preferred_principals");

    let created = h
        .ctx
        .contacts()
        .create_with_organization(ContactWithOrganization {
            contact: ContactInput::new("Ada", "Lovelace", uuid::Uuid::nil()),
            organization: OrganizationChoice::Existing(distributor.id),
            preferred_principals: vec![PrincipalPreference {
                principal_organization_id: principal.id,
                advocacy_strength: AdvocacyStrength::new(8).unwrap(),
            }],
        })
        .await
        .unwrap();

    assert!(!created.is_complete());
    assert_eq!(created.failed_principals.len(), 1);
    assert_eq!(created.failed_principals[0].principal_organization_id, principal.id);
    assert_eq!(h.ctx.contacts().get(created.contact.id).await.unwrap().id, created.contact.id);

    let toasts = h.toasts.drain();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].level, ToastLevel::Warning);
}

#[tokio::test]
async fn principal_links_are_stored_with_the_contact() {
    let h = common::signed_in();
    let distributor = h.organization("Sysco").await;
    let principal = h.organization("Heinz").await;

    let created = h
        .ctx
        .contacts()
        .create_with_organization(ContactWithOrganization {
            contact: ContactInput::new("Ada", "Lovelace", uuid::Uuid::nil()),
            organization: OrganizationChoice::Existing(distributor.id),
            preferred_principals: vec![PrincipalPreference {
                principal_organization_id: principal.id,
                advocacy_strength: AdvocacyStrength::new(8).unwrap(),
            }],
        })
        .await
        .unwrap();

    assert!(created.is_complete());
    let links = h
        .ctx
        .preferred_principals()
        .for_contact(created.contact.id)
        .await
        .unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].advocacy_strength.get(), 8);
    assert!(h.toasts.is_empty());
}

#[tokio::test]
async fn logging_an_interaction_updates_the_contact() {
    let h = common::signed_in();
    let org = h.organization("Blue Plate Diner").await;
    let contact = h.contact("Ada", "Lovelace", org.id).await;
    let when = Utc::now() - Duration::hours(1);

    h.ctx
        .interactions()
        .create(&InteractionInput {
            interaction_type: InteractionType::Call,
            subject: "Menu review".into(),
            description: None,
            interaction_date: when,
            contact_id: Some(contact.id),
            organization_id: Some(org.id),
            opportunity_id: None,
            follow_up_required: false,
            follow_up_date: None,
        })
        .await
        .unwrap();

    let refreshed = h.ctx.contacts().get(contact.id).await.unwrap();
    assert_eq!(
        refreshed.last_interaction_at.map(|t| t.timestamp()),
        Some(when.timestamp())
    );
    assert_eq!(h.ctx.interactions().by_contact(contact.id).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn lists_retry_transient_failures() {
    let h = common::signed_in();
    let org = h.organization("Blue Plate Diner").await;
    h.contact("Ada", "Lovelace", org.id).await;
    h.backend.fail_next_selects(2);

    let listed = h.ctx.contacts().list(&ContactFilters::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(h.backend.select_calls(), 3);
}

#[tokio::test]
async fn moving_a_contact_refreshes_the_organization_it_left() {
    let h = common::signed_in();
    let from = h.organization("Blue Plate Diner").await;
    let to = h.organization("Green Fork").await;
    let contacts = h.ctx.contacts();

    let mut input = ContactInput::new("Ada", "Lovelace", from.id);
    input.is_primary_contact = true;
    let contact = contacts.create(&input).await.unwrap();
    assert_eq!(contacts.by_organization(from.id).await.unwrap().len(), 1);
    assert!(contacts.primary_for(from.id).await.unwrap().is_some());

    contacts
        .update(
            contact.id,
            &ContactPatch {
                organization_id: Some(to.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(contacts.by_organization(from.id).await.unwrap().is_empty());
    assert!(contacts.primary_for(from.id).await.unwrap().is_none());
    assert_eq!(contacts.by_organization(to.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn renaming_an_organization_refreshes_contacts_that_embed_it() {
    let h = common::signed_in();
    let org = h.organization("Acme").await;
    let contact = h.contact("John", "Smith", org.id).await;
    let contacts = h.ctx.contacts();

    let listed = contacts.list(&ContactFilters::default()).await.unwrap();
    assert_eq!(listed[0].organization_name(), Some("Acme"));
    assert_eq!(contacts.get(contact.id).await.unwrap().organization_name(), Some("Acme"));

    h.ctx
        .organizations()
        .update(
            org.id,
            &OrganizationPatch {
                name: Some("Beta Foods".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let listed = contacts.list(&ContactFilters::default()).await.unwrap();
    assert_eq!(listed[0].organization_name(), Some("Beta Foods"));
    assert_eq!(
        contacts.get(contact.id).await.unwrap().organization_name(),
        Some("Beta Foods")
    );
}

#[tokio::test]
async fn list_search_matches_organization_name() {
    let h = common::signed_in();
    let acme = h.organization("Acme").await;
    let bistro = h.organization("Bistro").await;
    let john = h.contact("John", "Smith", acme.id).await;
    h.contact("Jane", "Doe", bistro.id).await;
    let contacts = h.ctx.contacts();

    let search = |text: &str| ContactFilters {
        search: Some(text.to_string()),
        ..Default::default()
    };

    let found = contacts.list(&search("ACME")).await.unwrap();
    assert_eq!(found.iter().map(|c| c.id).collect::<Vec<_>>(), vec![john.id]);
    assert_eq!(contacts.list(&search("doe")).await.unwrap().len(), 1);
    assert!(contacts.list(&search("%")).await.unwrap().is_empty());
}
