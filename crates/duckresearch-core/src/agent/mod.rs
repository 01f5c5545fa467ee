//! Agent capability contracts.
//!
//! The reasoning agents are opaque collaborators: the driver only needs
//! `run(prompt) -> text` plus a coarse view of their internal steps.

pub mod command;

use crate::error::AgentError;
use crate::events::{EventCollector, Stage};
use crate::text;
use serde::{Deserialize, Serialize};

const PLAN_PREVIEW_CHARS: usize = 100;
const OUTPUT_PREVIEW_CHARS: usize = 150;
const ERROR_PREVIEW_CHARS: usize = 100;

/// Which of the two collaborating agents is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Search,
    Manager,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Search => "search_agent",
            AgentRole::Manager => "manager_agent",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::Search => "Search agent",
            AgentRole::Manager => "Manager agent",
        }
    }
}

/// Coarse classification of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    WebSearch,
    VisitPage,
    InspectDocument,
    FindOnPage,
    Other,
}

impl ActionKind {
    pub fn from_tool_name(tool: &str) -> Self {
        let tool = tool.to_lowercase();
        if tool.contains("search") {
            ActionKind::WebSearch
        } else if tool.contains("visit") {
            ActionKind::VisitPage
        } else if tool.contains("inspect") {
            ActionKind::InspectDocument
        } else if tool.contains("find") {
            ActionKind::FindOnPage
        } else if tool.contains("page") {
            ActionKind::VisitPage
        } else {
            ActionKind::Other
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            ActionKind::WebSearch => "searching the web",
            ActionKind::VisitPage => "visiting a web page",
            ActionKind::InspectDocument => "inspecting a document",
            ActionKind::FindOnPage => "searching within the page",
            ActionKind::Other => "running a tool",
        }
    }
}

/// One internal reasoning step reported by an agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentStep {
    Planning {
        step: u32,
        #[serde(default)]
        plan: Option<String>,
    },
    Action {
        step: u32,
        #[serde(default)]
        tool: Option<String>,
        #[serde(default)]
        output: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    FinalAnswer {
        #[serde(default)]
        step: Option<u32>,
    },
}

/// Receives step notifications while an agent runs.
pub trait StepObserver: Send + Sync {
    fn on_step(&self, step: &AgentStep);
}

pub struct NoopObserver;

impl StepObserver for NoopObserver {
    fn on_step(&self, _step: &AgentStep) {}
}

/// Opaque reasoning capability.
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Run the agent to completion on `prompt`.
    async fn run(&self, prompt: &str, observer: &dyn StepObserver) -> Result<String, AgentError>;
}

/// Translates agent steps into status events.
pub struct StatusStepObserver {
    role: AgentRole,
    events: EventCollector,
    tracked: bool,
}

impl StatusStepObserver {
    pub fn new(role: AgentRole, events: EventCollector) -> Self {
        Self {
            role,
            events,
            tracked: true,
        }
    }

    /// Report steps as plain info that does not move the progress bar.
    pub fn untracked(mut self) -> Self {
        self.tracked = false;
        self
    }

    fn emit(&self, stage: Stage, message: String) {
        let stage = if self.tracked { stage } else { Stage::Info };
        self.events.emit(stage, message);
    }
}

impl StepObserver for StatusStepObserver {
    fn on_step(&self, step: &AgentStep) {
        let role = self.role;
        let name = role.display_name();

        match step {
            AgentStep::Planning { step, plan } => {
                self.emit(
                    Stage::AgentPlanning { role },
                    format!("{name} - step {step}: drafting a plan..."),
                );
                if let Some(plan) = plan.as_deref().filter(|p| !p.trim().is_empty()) {
                    self.emit(
                        Stage::Info,
                        format!("{name} - plan: {}", text::preview(plan, PLAN_PREVIEW_CHARS)),
                    );
                }
            }
            AgentStep::Action {
                step,
                tool,
                output,
                error,
            } => {
                match tool.as_deref() {
                    Some(tool) => {
                        let kind = ActionKind::from_tool_name(tool);
                        self.emit(
                            Stage::AgentAction { role, kind },
                            format!("{name} - step {step}: {} ({tool})...", kind.describe()),
                        );
                    }
                    None => self.emit(
                        Stage::Info,
                        format!("{name} - step {step}: processing..."),
                    ),
                }

                if let Some(output) = output.as_deref() {
                    let clean = text::strip_ansi(output);
                    if !clean.trim().is_empty() {
                        self.emit(
                            Stage::AgentStepCompleted { role },
                            format!(
                                "{name} - step {step} done: {}",
                                text::preview(clean.trim(), OUTPUT_PREVIEW_CHARS)
                            ),
                        );
                    }
                }

                if let Some(error) = error.as_deref() {
                    self.emit(
                        Stage::AgentStepFailed { role },
                        format!(
                            "{name} - step {step}: error: {}",
                            text::preview(
                                &text::redact_secrets(&text::strip_ansi(error)),
                                ERROR_PREVIEW_CHARS
                            )
                        ),
                    );
                }
            }
            AgentStep::FinalAnswer { .. } => {
                self.emit(
                    Stage::AgentFinalAnswer { role },
                    format!("{name} - composing the final answer..."),
                );
            }
        }
    }
}
