use std::sync::Arc;
use uuid::Uuid;

use kitchen_pantry_crm::backend::MemoryBackend;
use kitchen_pantry_crm::config::AppConfig;
use kitchen_pantry_crm::models::{Contact, ContactInput, Organization, OrganizationInput, OrganizationType};
use kitchen_pantry_crm::notify::ToastQueue;
use kitchen_pantry_crm::CrmContext;

pub struct Harness {
    pub ctx: CrmContext,
    pub backend: Arc<MemoryBackend>,
    pub toasts: Arc<ToastQueue>,
}

pub fn signed_in() -> Harness {
    with_backend(MemoryBackend::signed_in(Uuid::new_v4()))
}

pub fn signed_out() -> Harness {
    with_backend(MemoryBackend::new())
}

fn with_backend(backend: MemoryBackend) -> Harness {
    let backend = Arc::new(backend);
    let toasts = Arc::new(ToastQueue::new());
    let ctx = CrmContext::new(AppConfig::default(), backend.clone(), toasts.clone());
    Harness {
        ctx,
        backend,
        toasts,
    }
}

impl Harness {
    pub async fn organization(&self, name: &str) -> Organization {
        self.ctx
            .organizations()
            .create(&OrganizationInput::named(name, OrganizationType::Customer))
            .await
            .unwrap()
    }

    pub async fn contact(&self, first: &str, last: &str, organization_id: Uuid) -> Contact {
        self.ctx
            .contacts()
            .create(&ContactInput::new(first, last, organization_id))
            .await
            .unwrap()
    }
}
