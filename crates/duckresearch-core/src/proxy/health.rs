use super::ProxyCandidate;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Liveness check for a single candidate.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    /// `true` only when a request through `candidate` succeeded. Never retries.
    async fn test(&self, candidate: &ProxyCandidate) -> bool;
}

/// Probes a fixed endpoint through the candidate proxy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    async fn try_probe(&self, candidate: &ProxyCandidate) -> Result<bool, reqwest::Error> {
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(candidate.address.as_str())?)
            .timeout(self.timeout)
            .build()?;
        let response = client.get(&self.url).send().await?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }
}

#[async_trait]
impl ProxyProbe for HttpProbe {
    async fn test(&self, candidate: &ProxyCandidate) -> bool {
        match self.try_probe(candidate).await {
            Ok(alive) => alive,
            Err(err) => {
                debug!(proxy = %candidate, error = %err, "proxy probe failed");
                false
            }
        }
    }
}
