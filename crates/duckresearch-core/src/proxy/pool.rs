use super::{HttpProbe, ProxyCandidate, ProxyProbe, ProxySource, default_sources};
use crate::config::ProxyConfig;
use crate::events::{EventCollector, Stage};
use crate::{DuckResearchError, metrics};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

/// Refresh policy knobs.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub min_entries: usize,
    pub refresh_interval: Duration,
    pub max_probes_per_source: usize,
}

impl From<&ProxyConfig> for PoolSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            min_entries: config.min_proxies,
            refresh_interval: config.refresh_interval(),
            max_probes_per_source: config.max_probes_per_source,
        }
    }
}

#[derive(Debug, Clone)]
struct ProxyRecord {
    address: String,
}

#[derive(Debug, Default)]
struct PoolState {
    entries: Vec<ProxyRecord>,
    cursor: usize,
    last_refresh: Option<Instant>,
    current: Option<String>,
}

impl PoolState {
    fn is_fresh(&self, now: Instant, settings: &PoolSettings) -> bool {
        let recent = self
            .last_refresh
            .is_some_and(|at| now.duration_since(at) < settings.refresh_interval);
        recent && self.entries.len() >= settings.min_entries
    }
}

/// Round-robin registry of verified proxies.
///
/// All state sits behind one async mutex that is held for the whole
/// get-or-refresh operation, so at most one refresh runs at a time.
pub struct ProxyPool {
    settings: PoolSettings,
    sources: Vec<Arc<dyn ProxySource>>,
    probe: Arc<dyn ProxyProbe>,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    /// `sources` are consulted in the given order on every refresh.
    pub fn new(
        settings: PoolSettings,
        sources: Vec<Arc<dyn ProxySource>>,
        probe: Arc<dyn ProxyProbe>,
    ) -> Self {
        Self {
            settings,
            sources,
            probe,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Pool over the built-in sources, probing `config.probe_url`.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, DuckResearchError> {
        info!(
            min_proxies = config.min_proxies,
            timeout_secs = config.timeout_secs,
            "initialising proxy pool"
        );
        Ok(Self::new(
            PoolSettings::from(config),
            default_sources()?,
            Arc::new(HttpProbe::new(
                config.probe_url.clone(),
                config.probe_timeout(),
            )),
        ))
    }

    /// Next proxy in rotation, refreshing first when the policy asks for it.
    ///
    /// `None` means no verified proxy is known; connect directly.
    pub async fn get(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await;

        if state.entries.is_empty() {
            state.current = None;
            return None;
        }

        let address = state.entries[state.cursor].address.clone();
        state.cursor = (state.cursor + 1) % state.entries.len();
        state.current = Some(address.clone());
        info!(proxy = %address, "using proxy");
        Some(address)
    }

    /// Address most recently handed out by [`ProxyPool::get`].
    pub async fn current(&self) -> Option<String> {
        self.state.lock().await.current.clone()
    }

    /// Run the refresh policy without rotating; returns the pool size.
    pub async fn refresh(&self) -> usize {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await;
        state.entries.len()
    }

    /// Copy of the current entries in rotation order.
    pub async fn snapshot(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .map(|record| record.address.clone())
            .collect()
    }

    async fn refresh_locked(&self, state: &mut PoolState) {
        let now = Instant::now();
        if state.is_fresh(now, &self.settings) {
            return;
        }

        info!("refreshing proxy list from configured sources");
        let verified = self.collect_verified().await;

        if verified.is_empty() {
            warn!(
                retained = state.entries.len(),
                "no working proxies found from any source"
            );
            metrics::record_refresh("empty", 0);
            return;
        }

        metrics::record_refresh("replaced", verified.len());
        info!(count = verified.len(), "loaded working proxies");
        state.entries = verified
            .into_iter()
            .map(|candidate| ProxyRecord {
                address: candidate.address,
            })
            .collect();
        state.cursor = 0;
        state.last_refresh = Some(now);
    }

    async fn collect_verified(&self) -> Vec<ProxyCandidate> {
        let mut verified = Vec::new();

        for source in &self.sources {
            if verified.len() >= self.settings.min_entries {
                break;
            }

            info!(source = source.name(), "trying proxy source");
            let batch: Vec<ProxyCandidate> = source
                .fetch()
                .await
                .into_iter()
                .take(self.settings.max_probes_per_source)
                .collect();

            let results = join_all(batch.iter().map(|candidate| self.probe.test(candidate))).await;
            for (candidate, alive) in batch.into_iter().zip(results) {
                metrics::record_probe(alive);
                if alive {
                    info!(proxy = %candidate, source = source.name(), "working proxy found");
                    verified.push(candidate);
                }
            }
        }

        verified
    }
}

/// Result of the bounded first population of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Ready(Option<String>),
    TimedOut,
    Failed(String),
}

impl BootstrapOutcome {
    /// Proxy to use, if any. Anything else means a direct connection.
    pub fn proxy(&self) -> Option<&str> {
        match self {
            BootstrapOutcome::Ready(proxy) => proxy.as_deref(),
            _ => None,
        }
    }
}

/// Fetch the first proxy from `pool` within `cap`.
///
/// The lookup runs on its own task. On timeout the task is left running
/// detached and its result is ignored; later callers of the pool still
/// benefit from whatever it manages to load.
pub async fn bootstrap_proxy(
    pool: Arc<ProxyPool>,
    cap: Duration,
    events: &EventCollector,
) -> BootstrapOutcome {
    events.emit(
        Stage::ProxySetup,
        format!("Loading proxy list (max {} seconds)...", cap.as_secs()),
    );

    let worker = tokio::spawn(async move { pool.get().await });
    let outcome = match tokio::time::timeout(cap, worker).await {
        Ok(Ok(proxy)) => BootstrapOutcome::Ready(proxy),
        Ok(Err(err)) => BootstrapOutcome::Failed(err.to_string()),
        Err(_) => BootstrapOutcome::TimedOut,
    };

    let message = match &outcome {
        BootstrapOutcome::Ready(Some(proxy)) => format!("Proxy pool ready - using {proxy}"),
        BootstrapOutcome::Ready(None) => {
            "No verified proxy available - using a direct connection".to_string()
        }
        BootstrapOutcome::TimedOut => "Proxy pool timed out - using a direct connection".to_string(),
        BootstrapOutcome::Failed(err) => {
            warn!(error = %err, "proxy bootstrap task failed");
            "Proxy pool failed - using a direct connection".to_string()
        }
    };
    events.emit(Stage::ProxySetup, message);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::StaticSource;
    use async_trait::async_trait;

    struct AliveProbe;

    #[async_trait]
    impl ProxyProbe for AliveProbe {
        async fn test(&self, _candidate: &ProxyCandidate) -> bool {
            true
        }
    }

    fn settings(min_entries: usize) -> PoolSettings {
        PoolSettings {
            min_entries,
            refresh_interval: Duration::from_secs(300),
            max_probes_per_source: 10,
        }
    }

    #[tokio::test]
    async fn rotates_and_wraps() {
        let pool = ProxyPool::new(
            settings(1),
            vec![Arc::new(StaticSource::new("s", ["p1", "p2", "p3"]))],
            Arc::new(AliveProbe),
        );

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(pool.get().await.unwrap());
        }
        assert_eq!(seen, vec!["p1", "p2", "p3", "p1", "p2"]);
        assert_eq!(pool.current().await.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn probes_at_most_configured_candidates_per_source() {
        let addresses: Vec<String> = (0..15).map(|i| format!("p{i}")).collect();
        let pool = ProxyPool::new(
            settings(50),
            vec![Arc::new(StaticSource::new("s", addresses))],
            Arc::new(AliveProbe),
        );

        assert_eq!(pool.refresh().await, 10);
    }

    #[tokio::test]
    async fn empty_pool_returns_none() {
        let pool = ProxyPool::new(settings(3), Vec::new(), Arc::new(AliveProbe));
        assert_eq!(pool.get().await, None);
        assert_eq!(pool.current().await, None);
    }

    #[tokio::test]
    async fn bootstrap_reports_ready_proxy() {
        let pool = Arc::new(ProxyPool::new(
            settings(1),
            vec![Arc::new(StaticSource::new("s", ["p1"]))],
            Arc::new(AliveProbe),
        ));
        let (events, mut receiver) = EventCollector::new();

        let outcome = bootstrap_proxy(pool, Duration::from_secs(5), &events).await;
        assert_eq!(outcome, BootstrapOutcome::Ready(Some("p1".to_string())));
        assert_eq!(outcome.proxy(), Some("p1"));

        let emitted = crate::events::drain(&mut receiver);
        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|e| e.stage == Stage::ProxySetup));
    }
}
