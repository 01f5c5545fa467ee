//! Per-request wiring: proxy selection, agent construction, orchestration.

use crate::DuckResearchError;
use crate::agent::{Agent, AgentRole};
use crate::config::Config;
use crate::events::{EventCollector, Stage};
use crate::orchestrator::{ResearchOrchestrator, ResearchOutcome, RoundPolicy};
use crate::proxy::{NetworkSettings, ProxyPool, bootstrap_proxy};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the agents once the network settings are known.
pub trait AgentFactory: Send + Sync {
    fn build(
        &self,
        role: AgentRole,
        network: &NetworkSettings,
    ) -> Result<Arc<dyn Agent>, DuckResearchError>;
}

/// Runs one research request end to end.
pub struct ResearchDriver<F> {
    config: Config,
    factory: F,
    pool: Option<Arc<ProxyPool>>,
    events: EventCollector,
}

impl<F: AgentFactory> ResearchDriver<F> {
    pub fn new(config: Config, factory: F, events: EventCollector) -> Self {
        Self {
            config,
            factory,
            pool: None,
            events,
        }
    }

    /// Share an existing pool instead of building one per request.
    pub fn with_pool(mut self, pool: Arc<ProxyPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Pick a proxy within the bootstrap cap, or fall back to a direct connection.
    pub async fn network_settings(&self) -> NetworkSettings {
        let browser = &self.config.browser;
        let proxy_config = &self.config.proxy;
        let direct = NetworkSettings::direct(
            std::time::Duration::from_secs(browser.request_timeout_secs),
            browser.user_agent.clone(),
        );

        if !proxy_config.enabled {
            self.events
                .emit(Stage::Info, "Using a direct internet connection");
            return direct;
        }

        self.events
            .emit(Stage::ProxySetup, "Initialising the proxy pool...");
        let pool = match &self.pool {
            Some(pool) => Arc::clone(pool),
            None => match ProxyPool::from_config(proxy_config) {
                Ok(pool) => Arc::new(pool),
                Err(err) => {
                    warn!(error = %err, "proxy pool unavailable");
                    self.events.emit(
                        Stage::ProxySetup,
                        "Proxy pool failed - using a direct connection",
                    );
                    return direct;
                }
            },
        };

        let outcome =
            bootstrap_proxy(pool, proxy_config.bootstrap_timeout(), &self.events).await;
        match outcome.proxy() {
            Some(proxy) => NetworkSettings {
                timeout: proxy_config.timeout(),
                ..direct.with_proxy(proxy)
            },
            None => direct,
        }
    }

    pub async fn run(&self, question: &str) -> Result<ResearchOutcome, DuckResearchError> {
        self.events
            .emit(Stage::PreparingModel, "Preparing the agents...");

        let network = self.network_settings().await;
        info!(proxy = ?network.proxy, "network settings resolved");

        let downloads = &self.config.browser.downloads_folder;
        tokio::fs::create_dir_all(downloads)
            .await
            .map_err(|err| DuckResearchError::config_io(downloads.clone(), err))?;
        self.events
            .emit(Stage::BrowserInit, "Initialising the browser tools...");

        let search_agent = self.factory.build(AgentRole::Search, &network)?;
        self.events
            .emit(Stage::SearchAgentReady, "Search agent ready");
        let manager_agent = self.factory.build(AgentRole::Manager, &network)?;
        self.events
            .emit(Stage::ManagerAgentReady, "Manager agent ready");

        let orchestrator = ResearchOrchestrator::new(
            search_agent,
            manager_agent,
            RoundPolicy::from(&self.config.research),
            self.events.clone(),
        );
        Ok(orchestrator.run(question).await)
    }
}
