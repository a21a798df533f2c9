pub mod backend;
pub mod bulk;
pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod notify;
pub mod query;
pub mod repo;
pub mod selection;

use anyhow::Context;
use std::sync::Arc;

use backend::{AuthUser, Backend, RestBackend};
use config::{AppConfig, UiPreferences};
use error::{CrmError, Result};
use notify::{LogNotifier, Notifier};
use query::{QueryClient, QueryConfig};
use repo::{
    ContactRepository, InteractionRepository, OpportunityRepository, OrganizationRepository,
    PreferredPrincipalRepository,
};

pub use error::CrmError as Error;

/// Everything a view needs, created once at startup and passed down.
///
/// Cloning is cheap; clones share the backend, the query cache and the
/// notifier.
#[derive(Clone)]
pub struct CrmContext {
    config: Arc<AppConfig>,
    backend: Arc<dyn Backend>,
    queries: QueryClient,
    notifier: Arc<dyn Notifier>,
}

impl CrmContext {
    pub fn new(config: AppConfig, backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        let queries = QueryClient::new(QueryConfig::from(&config));
        Self {
            config: Arc::new(config),
            backend,
            queries,
            notifier,
        }
    }

    /// Context talking to the configured REST backend.
    pub fn connect(config: AppConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let backend = RestBackend::from_config(&config)?;
        Ok(Self::new(config, Arc::new(backend), notifier))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn ui(&self) -> &UiPreferences {
        &self.config.ui
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn contacts(&self) -> ContactRepository {
        ContactRepository::new(self.clone())
    }

    pub fn organizations(&self) -> OrganizationRepository {
        OrganizationRepository::new(self.clone())
    }

    pub fn interactions(&self) -> InteractionRepository {
        InteractionRepository::new(self.clone())
    }

    pub fn opportunities(&self) -> OpportunityRepository {
        OpportunityRepository::new(self.clone())
    }

    pub fn preferred_principals(&self) -> PreferredPrincipalRepository {
        PreferredPrincipalRepository::new(self.clone())
    }

    /// Resolves the signed-in user; writes must not start without one.
    pub(crate) async fn require_user(&self) -> Result<AuthUser> {
        self.backend
            .current_user()
            .await?
            .ok_or_else(|| CrmError::Auth("no active session".to_string()))
    }
}

/// Logging goes through `log`; `RUST_LOG` controls the level (default `info`).
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Loads configuration from the platform config dir and connects.
pub fn start() -> anyhow::Result<CrmContext> {
    init_logging();

    let config_dir = AppConfig::default_dir();
    let config = AppConfig::load(&config_dir);
    let ctx = CrmContext::connect(config, Arc::new(LogNotifier))
        .with_context(|| format!("using config in {}", config_dir.display()))?;

    log::info!(
        "CRM data layer initialized against {}",
        ctx.config().backend_url
    );
    Ok(ctx)
}
