//! Round loop, early stop, and fallback chain scenarios.

use async_trait::async_trait;
use duckresearch_core::{
    Agent, AgentError, EventCollector, OutcomePath, ProgressTracker, ResearchOrchestrator,
    RoundPolicy, SessionState, Stage, StepObserver, events::drain,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct ScriptedAgent {
    name: &'static str,
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    fn new(name: &'static str, responses: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, prompt: &str, _observer: &dyn StepObserver) -> Result<String, AgentError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(reason)) => Err(AgentError::new(self.name, reason)),
            None => Err(AgentError::new(self.name, "script exhausted")),
        }
    }
}

fn text_of_len(label: &str, len: usize) -> String {
    let mut text = format!("{label}:");
    while text.len() < len {
        text.push('x');
    }
    text.truncate(len);
    text
}

fn policy(max_rounds: u32) -> RoundPolicy {
    RoundPolicy {
        max_rounds,
        acceptance_threshold: 50,
        min_rounds_before_early_stop: 3,
    }
}

fn orchestrator(
    search: &Arc<ScriptedAgent>,
    manager: &Arc<ScriptedAgent>,
    max_rounds: u32,
    events: EventCollector,
) -> ResearchOrchestrator {
    ResearchOrchestrator::new(search.clone(), manager.clone(), policy(max_rounds), events)
}

#[tokio::test]
async fn short_third_round_stops_early_and_only_accepts_long_rounds() {
    let round1 = text_of_len("r1", 120);
    let search = ScriptedAgent::new(
        "search_agent",
        vec![
            Ok(round1.clone()),
            Ok(text_of_len("r2", 30)),
            Ok(text_of_len("r3", 10)),
        ],
    );
    let manager = ScriptedAgent::new(
        "manager_agent",
        vec![
            Ok("strategy two".into()),
            Ok("strategy three".into()),
            Ok("final report".into()),
        ],
    );
    let (events, mut receiver) = EventCollector::new();

    let outcome = orchestrator(&search, &manager, 5, events).run("Why ducks?").await;

    assert_eq!(outcome.session.rounds.len(), 3);
    assert_eq!(outcome.session.accepted_results, vec![round1]);
    assert_eq!(outcome.path, OutcomePath::Report);
    assert_eq!(outcome.answer, "final report");
    assert_eq!(outcome.session.state, SessionState::Done);

    let lengths: Vec<usize> = outcome
        .session
        .rounds
        .iter()
        .map(|round| round.result_length)
        .collect();
    assert_eq!(lengths, vec![120, 30, 10]);

    let emitted = drain(&mut receiver);
    assert!(
        emitted
            .iter()
            .any(|event| event.stage == Stage::EarlyStop { round: 3 })
    );
}

#[tokio::test]
async fn first_two_short_rounds_never_stop_early() {
    let search = ScriptedAgent::new(
        "search_agent",
        vec![Ok("no".into()), Ok("nothing".into()), Ok("nope".into())],
    );
    let manager = ScriptedAgent::new(
        "manager_agent",
        vec![
            Ok("strategy two".into()),
            Ok("strategy three".into()),
            Ok("from my own knowledge".into()),
        ],
    );

    let outcome = orchestrator(&search, &manager, 6, EventCollector::disabled())
        .run("Why ducks?")
        .await;

    assert_eq!(outcome.session.rounds.len(), 3);
    assert!(outcome.session.accepted_results.is_empty());
    assert_eq!(outcome.path, OutcomePath::KnowledgeFallback);
    assert_eq!(outcome.answer, "from my own knowledge");
}

#[tokio::test]
async fn runs_all_rounds_when_results_stay_informative() {
    let results: Vec<String> = (1..=4).map(|i| text_of_len(&format!("r{i}"), 80)).collect();
    let search = ScriptedAgent::new(
        "search_agent",
        results.iter().cloned().map(Ok).collect(),
    );
    let manager = ScriptedAgent::new(
        "manager_agent",
        vec![
            Ok("s2".into()),
            Ok("s3".into()),
            Ok("s4".into()),
            Ok("report".into()),
        ],
    );

    let outcome = orchestrator(&search, &manager, 4, EventCollector::disabled())
        .run("Why ducks?")
        .await;

    assert_eq!(outcome.session.rounds.len(), 4);
    assert_eq!(outcome.session.accepted_results, results);

    let manager_prompts = manager.prompts();
    let report_prompt = manager_prompts.last().unwrap();
    assert!(report_prompt.contains("--- NEXT RESEARCH ROUND ---"));
    assert!(report_prompt.contains("Executive Summary"));
}

#[tokio::test]
async fn strategy_context_is_bounded_to_two_recent_results() {
    let search = ScriptedAgent::new(
        "search_agent",
        (1..=4)
            .map(|i| Ok(text_of_len(&format!("result-{i}"), 80)))
            .collect(),
    );
    let manager = ScriptedAgent::new(
        "manager_agent",
        vec![
            Ok("s2".into()),
            Ok("s3".into()),
            Ok("s4".into()),
            Ok("report".into()),
        ],
    );

    orchestrator(&search, &manager, 4, EventCollector::disabled())
        .run("Why ducks?")
        .await;

    let manager_prompts = manager.prompts();
    let round4_planning = &manager_prompts[2];
    assert!(round4_planning.contains("round 4"));
    assert!(round4_planning.contains("result-2"));
    assert!(round4_planning.contains("result-3"));
    assert!(!round4_planning.contains("result-1"));
}

#[tokio::test]
async fn planner_failure_uses_fallback_strategy() {
    let search = ScriptedAgent::new(
        "search_agent",
        vec![Ok(text_of_len("r1", 90)), Ok(text_of_len("r2", 90))],
    );
    let manager = ScriptedAgent::new(
        "manager_agent",
        vec![Err("planner offline".into()), Ok("report".into())],
    );
    let (events, mut receiver) = EventCollector::new();

    let outcome = orchestrator(&search, &manager, 2, events).run("Why ducks?").await;

    assert_eq!(outcome.path, OutcomePath::Report);
    let search_prompts = search.prompts();
    assert!(search_prompts[0].contains("Why ducks?"));
    assert!(search_prompts[1].contains("Focus for round 2"));

    let emitted = drain(&mut receiver);
    assert!(
        emitted
            .iter()
            .any(|event| event.stage == Stage::StrategyFallback { round: 2 })
    );
}

#[tokio::test]
async fn round_failure_falls_back_to_direct_search() {
    let search = ScriptedAgent::new(
        "search_agent",
        vec![Err("browser crashed".into()), Ok("direct answer".into())],
    );
    let manager = ScriptedAgent::new("manager_agent", Vec::new());

    let outcome = orchestrator(&search, &manager, 5, EventCollector::disabled())
        .run("Why ducks?")
        .await;

    assert_eq!(outcome.path, OutcomePath::DirectSearch);
    assert_eq!(outcome.answer, "direct answer");
    assert!(outcome.session.rounds.is_empty());
    assert_eq!(search.prompts()[1], "Why ducks?");
    assert!(manager.prompts().is_empty());
}

#[tokio::test]
async fn report_failure_falls_back_to_own_knowledge() {
    let search = ScriptedAgent::new("search_agent", vec![Ok(text_of_len("r1", 90))]);
    let manager = ScriptedAgent::new(
        "manager_agent",
        vec![Err("context window exceeded".into()), Ok("known answer".into())],
    );

    let outcome = orchestrator(&search, &manager, 1, EventCollector::disabled())
        .run("Why ducks?")
        .await;

    assert_eq!(outcome.path, OutcomePath::KnowledgeFallback);
    assert_eq!(outcome.answer, "known answer");
}

#[tokio::test]
async fn report_and_knowledge_failure_fall_back_to_direct_search() {
    let search = ScriptedAgent::new(
        "search_agent",
        vec![Ok(text_of_len("r1", 90)), Ok("direct answer".into())],
    );
    let manager = ScriptedAgent::new(
        "manager_agent",
        vec![Err("report down".into()), Err("knowledge down".into())],
    );

    let outcome = orchestrator(&search, &manager, 1, EventCollector::disabled())
        .run("Why ducks?")
        .await;

    assert_eq!(outcome.path, OutcomePath::DirectSearch);
    assert_eq!(outcome.answer, "direct answer");
}

#[tokio::test]
async fn exhausted_chain_synthesizes_error_answer() {
    let search = ScriptedAgent::new(
        "search_agent",
        vec![
            Ok(text_of_len("r1", 90)),
            Err(format!("search down {}", "y".repeat(400))),
        ],
    );
    let manager = ScriptedAgent::new(
        "manager_agent",
        vec![Err("report down".into()), Err("knowledge down".into())],
    );
    let (events, mut receiver) = EventCollector::new();

    let outcome = orchestrator(&search, &manager, 1, events).run("Why ducks?").await;

    assert_eq!(outcome.path, OutcomePath::ErrorReport);
    assert!(outcome.answer.contains("knowledge down"));
    assert!(outcome.answer.contains("search down"));
    assert!(!outcome.answer.contains(&"y".repeat(250)));
    assert!(outcome.answer.contains("Try again later"));

    let mut tracker = ProgressTracker::new();
    let mut last = 0.0;
    for event in drain(&mut receiver) {
        let fraction = tracker.observe(&event);
        assert!(fraction >= last);
        last = fraction;
    }
    assert_eq!(last, 1.0);
}

#[tokio::test]
async fn agent_errors_are_redacted_in_events_and_answer() {
    let search = ScriptedAgent::new(
        "search_agent",
        vec![
            Ok(text_of_len("r1", 90)),
            Err("proxy rejected bearer hunter2token".into()),
        ],
    );
    let manager = ScriptedAgent::new(
        "manager_agent",
        vec![
            Err("401 for api_key=hunter2token".into()),
            Err("still 401 for api_key=hunter2token".into()),
        ],
    );
    let (events, mut receiver) = EventCollector::new();

    let outcome = orchestrator(&search, &manager, 1, events).run("Why ducks?").await;

    assert_eq!(outcome.path, OutcomePath::ErrorReport);
    assert!(!outcome.answer.contains("hunter2token"));

    let emitted = drain(&mut receiver);
    let errors: Vec<_> = emitted.iter().filter(|event| event.stage == Stage::Error).collect();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|event| !event.message.contains("hunter2token")));
}
