use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::DuckResearchError;

const DEFAULT_CONFIG_PATH: &str = "duckresearch.toml";
const CONFIG_PATH_ENV: &str = "DUCKRESEARCH_CONFIG";
const MAX_SEARCH_ROUNDS_LIMIT: u32 = 10;

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub research: ResearchConfig,
    pub browser: BrowserConfig,
    pub logging: LoggingConfig,
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `DUCKRESEARCH_CONFIG` environment variable.
    /// 3. `duckresearch.toml` in the current working directory.
    ///
    /// Only the implicit default file may be absent, in which case the
    /// built-in defaults are used.
    pub fn load(path: Option<PathBuf>) -> Result<Config, DuckResearchError> {
        let (candidate, explicit) = resolve_path(path);
        if !explicit && !candidate.exists() {
            let config = Config::default();
            Self::validate(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| DuckResearchError::config_io(candidate.clone(), err))?;
        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from a TOML document.
    pub fn from_toml(raw: &str) -> Result<Config, DuckResearchError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| DuckResearchError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), DuckResearchError> {
        let proxy = &config.proxy;
        if proxy.min_proxies == 0 {
            return Err(invalid("proxy.min_proxies must be at least 1"));
        }
        if proxy.probe_timeout_secs == 0 || proxy.timeout_secs == 0 {
            return Err(invalid("proxy timeouts must be positive"));
        }
        if proxy.max_probes_per_source == 0 {
            return Err(invalid("proxy.max_probes_per_source must be at least 1"));
        }

        let research = &config.research;
        if research.max_search_rounds == 0 || research.max_search_rounds > MAX_SEARCH_ROUNDS_LIMIT
        {
            return Err(invalid(format!(
                "research.max_search_rounds must be within 1..={MAX_SEARCH_ROUNDS_LIMIT}"
            )));
        }
        if research.acceptance_threshold_chars == 0 {
            return Err(invalid("research.acceptance_threshold_chars must be positive"));
        }
        if research.max_steps_per_agent_run == 0 || research.manager_max_steps == 0 {
            return Err(invalid("agent step limits must be positive"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> DuckResearchError {
    DuckResearchError::InvalidConfiguration(message.into())
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route agent traffic through the pool. Off unless asked for.
    pub enabled: bool,
    pub min_proxies: usize,
    /// Request timeout handed to the browsing layer together with the proxy.
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub probe_url: String,
    pub refresh_interval_secs: u64,
    /// Wall-clock cap on the first pool population.
    pub bootstrap_timeout_secs: u64,
    pub max_probes_per_source: usize,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_proxies: 5,
            timeout_secs: 10,
            probe_timeout_secs: 5,
            probe_url: "https://httpbin.org/ip".to_string(),
            refresh_interval_secs: 300,
            bootstrap_timeout_secs: 5,
            max_probes_per_source: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub max_search_rounds: u32,
    pub max_steps_per_agent_run: u32,
    pub manager_max_steps: u32,
    pub acceptance_threshold_chars: usize,
    pub min_rounds_before_early_stop: u32,
    pub agent_timeout_secs: u64,
}

impl ResearchConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_search_rounds: 5,
            max_steps_per_agent_run: 20,
            manager_max_steps: 12,
            acceptance_threshold_chars: 50,
            min_rounds_before_early_stop: 3,
            agent_timeout_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub downloads_folder: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0".to_string(),
            request_timeout_secs: 300,
            downloads_folder: PathBuf::from("downloads_folder"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
