use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Core error type for DuckResearch.
#[derive(Debug, Error)]
pub enum DuckResearchError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DuckResearchError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }
}

/// Failure of a single agent invocation.
#[derive(Debug, Clone)]
pub struct AgentError {
    pub agent: String,
    pub reason: String,
}

impl AgentError {
    pub fn new(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.agent, self.reason)
    }
}

impl std::error::Error for AgentError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_error_display_names_agent() {
        let err = AgentError::new("search_agent", "rate limited");
        assert_eq!(err.to_string(), "search_agent failed: rate limited");
    }
}
