//! Status events emitted while a research request is driven.
//!
//! Every status the driver reports flows through an [`EventCollector`] so the
//! front end can render messages and a progress bar from a single ordered
//! stream.

use crate::agent::{ActionKind, AgentRole};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// What a status event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    PreparingModel,
    ProxySetup,
    BrowserInit,
    SearchAgentReady,
    ManagerAgentReady,
    ResearchStarted,
    RoundStarted { round: u32, total: u32 },
    StrategyPlanned { round: u32 },
    StrategyFallback { round: u32 },
    RoundCompleted { round: u32, length: usize },
    ShortResult { round: u32 },
    EarlyStop { round: u32 },
    RoundsAggregated { accepted: usize, length: usize },
    AgentPlanning { role: AgentRole },
    AgentAction { role: AgentRole, kind: ActionKind },
    AgentStepCompleted { role: AgentRole },
    AgentStepFailed { role: AgentRole },
    AgentFinalAnswer { role: AgentRole },
    ReportStarted,
    ReportCompleted,
    KnowledgeFallback,
    KnowledgeFallbackCompleted,
    DirectSearchFallback,
    DirectSearchCompleted,
    Error,
    Finished,
    Info,
}

impl Stage {
    /// Fixed stage to completion fraction table. `None` leaves progress unchanged.
    pub fn default_target(&self) -> Option<f64> {
        use AgentRole::{Manager, Search};

        let target = match self {
            Stage::PreparingModel => 0.05,
            Stage::BrowserInit => 0.10,
            Stage::SearchAgentReady => 0.15,
            Stage::ManagerAgentReady => 0.20,
            Stage::ResearchStarted => 0.25,
            Stage::RoundStarted { .. } => 0.30,
            Stage::AgentPlanning { role: Search } => 0.35,
            Stage::AgentAction {
                role: Search,
                kind: ActionKind::WebSearch,
            } => 0.45,
            Stage::AgentAction {
                role: Search,
                kind: ActionKind::VisitPage,
            } => 0.55,
            Stage::AgentAction {
                role: Search,
                kind: ActionKind::InspectDocument,
            } => 0.60,
            Stage::AgentStepCompleted { role: Search } => 0.65,
            Stage::RoundsAggregated { .. } => 0.70,
            Stage::ReportStarted | Stage::KnowledgeFallback | Stage::DirectSearchFallback => 0.72,
            Stage::AgentPlanning { role: Manager } => 0.75,
            Stage::AgentAction { role: Manager, .. } => 0.80,
            Stage::AgentStepCompleted { role: Manager } => 0.85,
            Stage::ReportCompleted
            | Stage::KnowledgeFallbackCompleted
            | Stage::DirectSearchCompleted => 0.90,
            Stage::Finished => 1.0,
            _ => return None,
        };
        Some(target)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Stage::Error)
    }
}

/// One status update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(flatten)]
    pub stage: Stage,
    pub message: String,
    /// Overrides the stage table when present.
    pub progress_hint: Option<f64>,
    pub timestamp_ms: u64,
}

impl StatusEvent {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            progress_hint: None,
            timestamp_ms: current_timestamp(),
        }
    }

    pub fn with_hint(mut self, hint: f64) -> Self {
        self.progress_hint = Some(hint);
        self
    }

    /// Fraction this event asks for, before the running maximum is applied.
    pub fn target(&self) -> Option<f64> {
        self.progress_hint.or_else(|| self.stage.default_target())
    }
}

/// Cloneable, ordered sink for status events.
#[derive(Clone)]
pub struct EventCollector {
    sender: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl EventCollector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A collector that only logs.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, stage: Stage, message: impl Into<String>) {
        self.send(StatusEvent::new(stage, message));
    }

    pub fn send(&self, event: StatusEvent) {
        if event.stage.is_error() {
            tracing::warn!(stage = ?event.stage, "{}", event.message);
        } else {
            tracing::debug!(stage = ?event.stage, "{}", event.message);
        }

        if let Some(sender) = &self.sender {
            if let Err(e) = sender.send(event) {
                tracing::warn!(error = %e, "Failed to emit status event");
            }
        }
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Get current Unix timestamp in milliseconds
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Drain everything currently buffered in `receiver`.
pub fn drain(receiver: &mut mpsc::UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
