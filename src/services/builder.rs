//! SdkBuilder - assembles a [`BreezServices`] from config, seed and backend.

use std::sync::Arc;
use std::time::Instant;

use super::{BreezServices, Config, NodeConfig, SessionGuard};
use crate::error::SdkResult;
use crate::events::EventListener;
use crate::greenlight::{EmbeddedScheduler, Greenlight};
use crate::models::GreenlightCredentials;
use crate::node_api::{NodeApi, NodeError, Scheduler};
use crate::persist::CredentialStore;
use crate::seed::Seed;

/// Builder for a session. Without an explicit backend the process-wide
/// [`EmbeddedScheduler`] is used.
pub struct SdkBuilder {
    config: Config,
    scheduler: Option<Arc<dyn Scheduler>>,
    node_api: Option<Arc<dyn NodeApi>>,
}

impl SdkBuilder {
    pub fn new(config: Config) -> Self {
        Self { config, scheduler: None, node_api: None }
    }

    /// Use a specific scheduler for registration, recovery and scheduling.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Attach an already connected node backend. Skips credential handling.
    pub fn node_api(mut self, node_api: Arc<dyn NodeApi>) -> Self {
        self.node_api = Some(node_api);
        self
    }

    fn scheduler_or_default(&self) -> Arc<dyn Scheduler> {
        self.scheduler.clone().unwrap_or_else(|| Arc::new(EmbeddedScheduler::shared()))
    }

    pub async fn register_node(&self, seed: &Seed) -> SdkResult<GreenlightCredentials> {
        self.config.validate()?;
        let NodeConfig::Greenlight { config } = &self.config.node_config;
        let scheduler = self.scheduler_or_default();
        let creds = Greenlight::register(
            scheduler.as_ref(),
            self.config.network,
            seed,
            config.partner_credentials.clone(),
            config.registration_code().map(str::to_string),
        )
        .await?;
        Ok(creds)
    }

    pub async fn recover_node(&self, seed: &Seed) -> SdkResult<GreenlightCredentials> {
        let scheduler = self.scheduler_or_default();
        Ok(Greenlight::recover(scheduler.as_ref(), self.config.network, seed).await?)
    }

    /// Create the services without starting them.
    pub fn build(
        self,
        seed: &Seed,
        creds: GreenlightCredentials,
        listener: Box<dyn EventListener>,
    ) -> SdkResult<Arc<BreezServices>> {
        self.config.validate()?;
        let node_api = match self.node_api.clone() {
            Some(api) => api,
            None => Arc::new(Greenlight::new(self.config.network, seed, creds, self.scheduler_or_default())?),
        };
        Ok(Arc::new(BreezServices::new(self.config, node_api, listener)))
    }

    /// Resolve credentials (stored, recovered or freshly registered), then
    /// build and start the session.
    pub async fn connect(self, seed: Seed, listener: Box<dyn EventListener>) -> SdkResult<Arc<BreezServices>> {
        let started = Instant::now();
        let guard = SessionGuard::acquire()?;
        self.config.validate()?;

        let services = match self.node_api.clone() {
            Some(api) => Arc::new(BreezServices::new(self.config, api, listener)),
            None => {
                let creds = self.resolve_credentials(&seed).await?;
                self.build(&seed, creds, listener)?
            }
        };

        services.start_with_guard(guard).await?;
        tracing::info!(node_id = %services.node_id(), "Connected in {:?}", started.elapsed());
        Ok(services)
    }

    /// Stored credentials if the scheduler still accepts them, otherwise
    /// recovered or freshly registered ones, which then replace the stored file.
    async fn resolve_credentials(&self, seed: &Seed) -> SdkResult<GreenlightCredentials> {
        let store = CredentialStore::new(&self.config.working_dir, self.config.network, seed)?;
        let node_id = store.node_id().to_string();
        let scheduler = self.scheduler_or_default();

        if let Some(creds) = store.load()? {
            match scheduler.schedule(&node_id, self.config.network, &creds).await {
                Ok(_) => {
                    tracing::debug!(node_id = %node_id, "Using stored credentials");
                    return Ok(creds);
                }
                Err(e @ (NodeError::NodeNotFound(_) | NodeError::Auth(_))) => {
                    tracing::warn!(node_id = %node_id, "Stored credentials rejected ({e}), resolving again");
                    store.clear()?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let creds = match Greenlight::recover(scheduler.as_ref(), self.config.network, seed).await {
            Ok(creds) => creds,
            Err(NodeError::NodeNotFound(_)) => self.register_node(seed).await?,
            Err(e) => return Err(e.into()),
        };
        store.save(&creds)?;
        tracing::info!(path = %store.path().display(), "Stored node credentials");
        Ok(creds)
    }
}
