//! Multi-round research state machine.
//!
//! Rounds run strictly in sequence: round `k + 1`'s strategy is planned from
//! round `k`'s output. Any failure degrades through a fixed fallback chain so
//! [`ResearchOrchestrator::run`] always ends with some answer.

use crate::agent::{Agent, AgentRole, StatusStepObserver};
use crate::config::ResearchConfig;
use crate::error::AgentError;
use crate::events::{EventCollector, Stage, StatusEvent};
use crate::{metrics, prompts, text};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const STRATEGY_CONTEXT_ROUNDS: usize = 2;
const STATUS_PREVIEW_CHARS: usize = 100;
const ERROR_DETAIL_CHARS: usize = 200;
const ROUND_PROGRESS_START: f64 = 0.30;
const ROUND_PROGRESS_SPAN: f64 = 0.35;

/// One executed search round.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchRound {
    pub index: u32,
    pub strategy: String,
    pub result: String,
    pub result_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStep {
    OwnKnowledge,
    DirectSearch,
    ErrorReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Round(u32),
    EarlyStop,
    Aggregate,
    Report,
    Fallback(FallbackStep),
    Done,
}

/// Everything gathered while answering one question.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchSession {
    pub id: Uuid,
    pub question: String,
    pub started_at: DateTime<Utc>,
    pub rounds: Vec<ResearchRound>,
    /// Results of the rounds that cleared the acceptance threshold, in round order.
    pub accepted_results: Vec<String>,
    pub state: SessionState,
}

impl ResearchSession {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            started_at: Utc::now(),
            rounds: Vec::new(),
            accepted_results: Vec::new(),
            state: SessionState::Init,
        }
    }

    pub fn combined_text(&self) -> String {
        self.accepted_results.join(prompts::ROUND_SEPARATOR)
    }

    fn recent_results(&self) -> Vec<&str> {
        let start = self
            .accepted_results
            .len()
            .saturating_sub(STRATEGY_CONTEXT_ROUNDS);
        self.accepted_results[start..]
            .iter()
            .map(String::as_str)
            .collect()
    }
}

/// Which step of the chain produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomePath {
    Report,
    KnowledgeFallback,
    DirectSearch,
    ErrorReport,
}

impl OutcomePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomePath::Report => "report",
            OutcomePath::KnowledgeFallback => "knowledge_fallback",
            OutcomePath::DirectSearch => "direct_search",
            OutcomePath::ErrorReport => "error_report",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    pub answer: String,
    pub path: OutcomePath,
    pub session: ResearchSession,
}

/// Acceptance and early-stop heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundPolicy {
    pub max_rounds: u32,
    pub acceptance_threshold: usize,
    pub min_rounds_before_early_stop: u32,
}

impl RoundPolicy {
    pub fn accepts(&self, result_length: usize) -> bool {
        result_length >= self.acceptance_threshold
    }

    pub fn should_stop_early(&self, round: u32, result_length: usize) -> bool {
        !self.accepts(result_length) && round >= self.min_rounds_before_early_stop
    }

    /// Whether the aggregated text is substantial enough for a report.
    pub fn supports_report(&self, combined: &str) -> bool {
        text::char_len(combined.trim()) > self.acceptance_threshold
    }
}

impl From<&ResearchConfig> for RoundPolicy {
    fn from(config: &ResearchConfig) -> Self {
        Self {
            max_rounds: config.max_search_rounds,
            acceptance_threshold: config.acceptance_threshold_chars,
            min_rounds_before_early_stop: config.min_rounds_before_early_stop,
        }
    }
}

/// Drives the search and manager agents through one research request.
pub struct ResearchOrchestrator {
    search_agent: Arc<dyn Agent>,
    manager_agent: Arc<dyn Agent>,
    policy: RoundPolicy,
    events: EventCollector,
}

impl ResearchOrchestrator {
    pub fn new(
        search_agent: Arc<dyn Agent>,
        manager_agent: Arc<dyn Agent>,
        policy: RoundPolicy,
        events: EventCollector,
    ) -> Self {
        Self {
            search_agent,
            manager_agent,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> &RoundPolicy {
        &self.policy
    }

    /// Answer `question`. Never fails; failures only lower answer quality.
    #[instrument(name = "orchestrator.run", skip(self))]
    pub async fn run(&self, question: &str) -> ResearchOutcome {
        let mut session = ResearchSession::new(question);
        info!(session_id = %session.id, max_rounds = self.policy.max_rounds, "starting research session");
        self.events
            .emit(Stage::ResearchStarted, "The research is starting...");

        let (answer, path) = match self.research(&mut session).await {
            Ok(done) => done,
            Err(primary) => self.recover(&mut session, primary).await,
        };

        session.state = SessionState::Done;
        metrics::record_outcome(path.as_str(), session.rounds.len());
        info!(
            session_id = %session.id,
            path = path.as_str(),
            rounds = session.rounds.len(),
            accepted = session.accepted_results.len(),
            "research session finished"
        );
        self.events
            .emit(Stage::Finished, "Research finished! Showing the report.");

        ResearchOutcome {
            answer,
            path,
            session,
        }
    }

    /// Rounds, aggregation, and report or own-knowledge fallback.
    async fn research(
        &self,
        session: &mut ResearchSession,
    ) -> Result<(String, OutcomePath), AgentError> {
        self.run_rounds(session).await?;
        self.synthesize(session).await
    }

    async fn run_rounds(&self, session: &mut ResearchSession) -> Result<(), AgentError> {
        let total = self.policy.max_rounds;
        let question = text::sanitize(&session.question);
        let search_observer = StatusStepObserver::new(AgentRole::Search, self.events.clone());

        self.events
            .emit(Stage::Info, format!("Starting up to {total} research rounds..."));

        for round in 1..=total {
            session.state = SessionState::Round(round);
            let hint =
                ROUND_PROGRESS_START + ROUND_PROGRESS_SPAN * f64::from(round - 1) / f64::from(total);
            self.events.send(
                StatusEvent::new(
                    Stage::RoundStarted { round, total },
                    format!("Research round {round}/{total}"),
                )
                .with_hint(hint),
            );

            let strategy = if round == 1 {
                prompts::initial_strategy(&question)
            } else {
                self.plan_strategy(session, &question, round).await
            };

            self.events.emit(
                Stage::Info,
                format!("Round {round}: search agent starts the internet research..."),
            );
            let raw = self
                .search_agent
                .run(&text::sanitize(&strategy), &search_observer)
                .await?;
            let result = text::sanitize(&raw);
            let length = text::char_len(&result);

            self.events.emit(
                Stage::RoundCompleted { round, length },
                format!("Round {round} finished. Result length: {length} characters"),
            );

            let accepted = self.policy.accepts(length);
            metrics::record_round(accepted);
            session.rounds.push(ResearchRound {
                index: round,
                strategy,
                result: result.clone(),
                result_length: length,
            });

            if accepted {
                session.accepted_results.push(result);
                self.events.emit(
                    Stage::Info,
                    format!("Round {round}: added {length} characters to the overall result"),
                );
                continue;
            }

            self.events.emit(
                Stage::ShortResult { round },
                format!(
                    "Short answer in round {round}: '{}'",
                    text::preview(&result, STATUS_PREVIEW_CHARS)
                ),
            );
            if self.policy.should_stop_early(round, length) {
                session.state = SessionState::EarlyStop;
                self.events.emit(
                    Stage::EarlyStop { round },
                    format!("Research stopped after {round} rounds (short answers)"),
                );
                break;
            }
        }

        Ok(())
    }

    /// Strategy for rounds after the first; never fails.
    async fn plan_strategy(&self, session: &ResearchSession, question: &str, round: u32) -> String {
        self.events.emit(
            Stage::Info,
            format!("Manager agent plans the search strategy for round {round}..."),
        );

        let prompt = prompts::strategy_planning(question, round, &session.recent_results());
        let observer =
            StatusStepObserver::new(AgentRole::Manager, self.events.clone()).untracked();

        match self
            .manager_agent
            .run(&text::sanitize(&prompt), &observer)
            .await
        {
            Ok(strategy) => {
                self.events.emit(
                    Stage::StrategyPlanned { round },
                    format!("Search strategy for round {round} planned"),
                );
                text::sanitize(&strategy)
            }
            Err(err) => {
                warn!(
                    round,
                    error = %redacted(&err),
                    "strategy planning failed, using fallback strategy"
                );
                self.events.emit(
                    Stage::StrategyFallback { round },
                    format!("Fallback search strategy for round {round}"),
                );
                prompts::fallback_strategy(question, round)
            }
        }
    }

    async fn synthesize(
        &self,
        session: &mut ResearchSession,
    ) -> Result<(String, OutcomePath), AgentError> {
        session.state = SessionState::Aggregate;
        let question = text::sanitize(&session.question);
        let combined = session.combined_text();
        let accepted = session.accepted_results.len();
        let length = text::char_len(&combined);

        self.events.emit(
            Stage::RoundsAggregated { accepted, length },
            format!("{accepted} accepted research rounds combined. Total length: {length} characters"),
        );

        let observer = StatusStepObserver::new(AgentRole::Manager, self.events.clone());

        if self.policy.supports_report(&combined) {
            session.state = SessionState::Report;
            self.events.emit(
                Stage::ReportStarted,
                "Manager agent is analysing the combined search results...",
            );
            let prompt = prompts::analysis(&question, &combined, accepted);
            match self.manager_agent.run(&prompt, &observer).await {
                Ok(answer) => {
                    self.events.emit(
                        Stage::ReportCompleted,
                        "Manager agent finished the analysis and the report.",
                    );
                    return Ok((text::sanitize(&answer), OutcomePath::Report));
                }
                Err(err) => {
                    let detail = redacted(&err);
                    warn!(error = %detail, "report synthesis failed");
                    self.events.emit(
                        Stage::Error,
                        format!(
                            "Report synthesis failed: {}",
                            text::preview(&detail, STATUS_PREVIEW_CHARS)
                        ),
                    );
                }
            }
        } else {
            self.events.emit(
                Stage::Info,
                format!("{} research rounds produced no sufficient results.", session.rounds.len()),
            );
        }

        session.state = SessionState::Fallback(FallbackStep::OwnKnowledge);
        self.events.emit(
            Stage::KnowledgeFallback,
            "Manager agent attempts an alternative analysis...",
        );
        let answer = self
            .manager_agent
            .run(&prompts::knowledge_fallback(&question), &observer)
            .await?;
        self.events.emit(
            Stage::KnowledgeFallbackCompleted,
            "Manager agent finished the alternative analysis.",
        );
        Ok((text::sanitize(&answer), OutcomePath::KnowledgeFallback))
    }

    /// Direct search with the raw question, then a synthesized apology.
    async fn recover(
        &self,
        session: &mut ResearchSession,
        primary: AgentError,
    ) -> (String, OutcomePath) {
        let primary_detail = redacted(&primary);
        warn!(
            error = %primary_detail,
            "research orchestration failed, falling back to direct search"
        );
        self.events.emit(
            Stage::Error,
            format!(
                "Error during the manager research: {}",
                text::preview(&primary_detail, STATUS_PREVIEW_CHARS)
            ),
        );

        session.state = SessionState::Fallback(FallbackStep::DirectSearch);
        self.events.emit(
            Stage::DirectSearchFallback,
            "Starting a direct web search as fallback...",
        );
        let observer = StatusStepObserver::new(AgentRole::Search, self.events.clone());
        match self
            .search_agent
            .run(&text::sanitize(&session.question), &observer)
            .await
        {
            Ok(answer) => {
                self.events.emit(
                    Stage::DirectSearchCompleted,
                    "Fallback web search finished.",
                );
                (text::sanitize(&answer), OutcomePath::DirectSearch)
            }
            Err(fallback) => {
                let fallback_detail = redacted(&fallback);
                warn!(error = %fallback_detail, "direct search fallback failed");
                self.events.emit(
                    Stage::Error,
                    format!(
                        "Fallback web search failed as well: {}",
                        text::preview(&fallback_detail, STATUS_PREVIEW_CHARS)
                    ),
                );
                session.state = SessionState::Fallback(FallbackStep::ErrorReport);
                let answer = prompts::error_report(
                    text::truncate_chars(&primary_detail, ERROR_DETAIL_CHARS),
                    text::truncate_chars(&fallback_detail, ERROR_DETAIL_CHARS),
                );
                (answer, OutcomePath::ErrorReport)
            }
        }
    }
}

/// Agent error text safe for logs, status events and the final answer.
fn redacted(err: &AgentError) -> String {
    text::redact_secrets(&text::sanitize(&err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RoundPolicy {
        RoundPolicy::from(&ResearchConfig::default())
    }

    #[test]
    fn early_stop_needs_short_result_and_third_round() {
        let policy = policy();
        assert!(!policy.should_stop_early(1, 0));
        assert!(!policy.should_stop_early(2, 10));
        assert!(policy.should_stop_early(3, 49));
        assert!(!policy.should_stop_early(3, 50));
        assert!(policy.should_stop_early(7, 0));
    }

    #[test]
    fn acceptance_is_inclusive_at_threshold() {
        let policy = policy();
        assert!(policy.accepts(50));
        assert!(!policy.accepts(49));
    }

    #[test]
    fn report_requires_more_than_threshold_after_trim() {
        let policy = policy();
        assert!(!policy.supports_report(&format!("  {}  ", "a".repeat(50))));
        assert!(policy.supports_report(&"a".repeat(51)));
    }

    #[test]
    fn recent_results_keep_last_two() {
        let mut session = ResearchSession::new("q");
        assert!(session.recent_results().is_empty());
        session.accepted_results = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(session.recent_results(), vec!["b", "c"]);
        assert_eq!(
            session.combined_text(),
            format!("a{sep}b{sep}c", sep = prompts::ROUND_SEPARATOR)
        );
    }

    #[test]
    fn redacted_masks_credentials() {
        let err = AgentError::new("manager_agent", format!("api_key=abc123 {}", "x".repeat(400)));
        let detail = redacted(&err);
        assert!(!detail.contains("abc123"));
        let truncated = text::truncate_chars(&detail, ERROR_DETAIL_CHARS);
        assert_eq!(truncated.chars().count(), ERROR_DETAIL_CHARS);
    }
}
