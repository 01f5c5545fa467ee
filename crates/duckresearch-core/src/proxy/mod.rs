//! Rotating outbound proxy pool.
//!
//! Candidates are scraped from [`ProxySource`]s, verified by a [`ProxyProbe`]
//! and served round-robin by [`ProxyPool`]. Every failure along the way
//! degrades to "no proxy", which callers treat as a direct connection.

mod health;
mod pool;
mod source;

pub use health::{HttpProbe, ProxyProbe};
pub use pool::{BootstrapOutcome, PoolSettings, ProxyPool, bootstrap_proxy};
pub use source::{
    HttpScrapeSource, ProxySource, StaticSource, default_sources, extract_candidates,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unverified proxy address (`scheme://host:port`) scraped from a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyCandidate {
    pub address: String,
}

impl ProxyCandidate {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Connection settings handed to the browsing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl NetworkSettings {
    pub fn direct(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            proxy: None,
            timeout,
            user_agent: user_agent.into(),
        }
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn is_direct(&self) -> bool {
        self.proxy.is_none()
    }

    /// Configure a reqwest client for these settings.
    pub fn apply(
        &self,
        builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder, reqwest::Error> {
        let builder = builder
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone());
        match &self.proxy {
            Some(proxy) => Ok(builder.proxy(reqwest::Proxy::all(proxy.as_str())?)),
            None => Ok(builder),
        }
    }

    /// Environment variables that route a child process through the proxy.
    pub fn proxy_env(&self) -> Vec<(String, String)> {
        let Some(proxy) = &self.proxy else {
            return Vec::new();
        };
        ["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"]
            .into_iter()
            .map(|key| (key.to_string(), proxy.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_settings_export_no_env() {
        let settings = NetworkSettings::direct(Duration::from_secs(10), "ua");
        assert!(settings.is_direct());
        assert!(settings.proxy_env().is_empty());
        assert!(settings.apply(reqwest::Client::builder()).is_ok());
    }

    #[test]
    fn proxied_settings_build_client() {
        let settings =
            NetworkSettings::direct(Duration::from_secs(10), "ua").with_proxy("http://1.2.3.4:80");
        let env = settings.proxy_env();
        assert_eq!(env.len(), 4);
        assert!(env.iter().all(|(_, value)| value == "http://1.2.3.4:80"));

        let client = settings
            .apply(reqwest::Client::builder())
            .and_then(|builder| builder.build());
        assert!(client.is_ok());
    }
}
