//! DuckResearch core: the research driver.
//!
//! Drives a search agent through successive research rounds planned by a
//! manager agent, assembles a report, and degrades through a fallback chain
//! on failure. Outbound traffic can be routed through a rotating pool of
//! verified public proxies.

pub mod agent;
mod config;
mod driver;
mod error;
pub mod events;
pub mod metrics;
mod orchestrator;
mod progress;
pub mod prompts;
pub mod proxy;
pub mod report;
mod telemetry;
pub mod text;
pub mod workspace;

pub use agent::{
    ActionKind, Agent, AgentRole, AgentStep, NoopObserver, StatusStepObserver, StepObserver,
    command::CommandAgent,
};
pub use config::{
    BrowserConfig, Config, ConfigLoader, LoggingConfig, ProxyConfig, ResearchConfig,
};
pub use driver::{AgentFactory, ResearchDriver};
pub use error::{AgentError, DuckResearchError};
pub use events::{EventCollector, Stage, StatusEvent};
pub use orchestrator::{
    FallbackStep, OutcomePath, ResearchOrchestrator, ResearchOutcome, ResearchRound,
    ResearchSession, RoundPolicy, SessionState,
};
pub use progress::{ERROR_PROGRESS_FLOOR, ProgressTracker};
pub use proxy::{BootstrapOutcome, NetworkSettings, ProxyCandidate, ProxyPool, bootstrap_proxy};
pub use telemetry::{TelemetryOptions, init_telemetry};
