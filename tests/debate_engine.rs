//! End-to-end tests of the debate engine with mock workers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use debate_forge::agents::{Provider, Worker, WorkerError};
use debate_forge::config::EngineConfig;
use debate_forge::consensus::{
    ConsensusAssessment, ConsensusStrategy, ConsensusStrategyError, ExitCriteria,
};
use debate_forge::debate::{
    AgentResponse, ContextPriority, ContextResult, DebateEngine, DebateEvent, DebateMode,
    RoundContext, RoundStatus, SessionStatus, Toolkit,
};
use debate_forge::llm::{BucketConfig, RateLimiter, RateLimiterConfig, RetryPolicy};
use debate_forge::{EngineError, ErrorKind};

/// Worker that answers from a script and records what it saw.
struct MockWorker {
    id: String,
    provider: Provider,
    positions: Vec<String>,
    failures: Mutex<VecDeque<WorkerError>>,
    needs: Option<String>,
    calls: AtomicU32,
    visible: Mutex<Vec<usize>>,
    answers_seen: Mutex<Vec<Vec<String>>>,
}

impl MockWorker {
    fn new(id: &str, positions: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            provider: Provider::OpenAi,
            positions: positions.iter().map(|p| p.to_string()).collect(),
            failures: Mutex::new(VecDeque::new()),
            needs: None,
            calls: AtomicU32::new(0),
            visible: Mutex::new(Vec::new()),
            answers_seen: Mutex::new(Vec::new()),
        }
    }

    fn on(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    fn failing(self, errors: Vec<WorkerError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    /// Blocks round 1 until `query` is answered.
    fn needing(mut self, query: &str) -> Self {
        self.needs = Some(query.to_string());
        self
    }
}

#[async_trait]
impl Worker for MockWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    async fn generate_response(
        &self,
        context: &RoundContext,
        toolkit: &dyn Toolkit,
    ) -> Result<AgentResponse, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.visible.lock().unwrap().push(context.current_round.len());
        self.answers_seen.lock().unwrap().push(
            context
                .supplied_context
                .iter()
                .map(|c| c.answer.clone())
                .collect(),
        );

        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        if let Some(query) = &self.needs {
            if context.round_number == 1 && context.supplied_context.is_empty() {
                toolkit.ask(&self.id, query, "cannot argue without it", ContextPriority::Required);
            }
        }

        let index = (context.round_number as usize - 1).min(self.positions.len() - 1);
        Ok(AgentResponse::new(
            &self.id,
            &self.id,
            self.positions[index].clone(),
            "mock reasoning",
            0.8,
        ))
    }
}

fn workers(mocks: &[Arc<MockWorker>]) -> Vec<Arc<dyn Worker>> {
    mocks.iter().map(|m| m.clone() as Arc<dyn Worker>).collect()
}

const SHARED: &str = "Ship the feature behind a flag next sprint";

#[tokio::test(start_paused = true)]
async fn test_debate_converges_and_exits_early() {
    let engine = DebateEngine::builder()
        .config(EngineConfig::default().with_exit_criteria(ExitCriteria::new(0.9, 2)))
        .build()
        .unwrap();

    let a = Arc::new(MockWorker::new(
        "a",
        &["Delay the release by a quarter", "Cut scope drastically", SHARED],
    ));
    let b = Arc::new(MockWorker::new(
        "b",
        &["Hire contractors immediately", "Rewrite the billing module", SHARED],
    ));
    let c = Arc::new(MockWorker::new("c", &["Outsource testing", SHARED]));
    let participants = workers(&[a, b, c]);

    let session = engine
        .start_session("Release plan", DebateMode::Collaborative, &participants, 10)
        .await
        .unwrap();
    let rounds = engine
        .execute_rounds(&participants, &session.id, 10, None, Vec::new())
        .await
        .unwrap();

    // Rounds 3 and 4 are unanimous, so the session stops after round 4.
    assert_eq!(rounds.len(), 4);
    let stored = engine.get_session(&session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.current_round, 4);
    assert!(stored.consensus.unwrap().agreement_level >= 0.9);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_mode_shows_earlier_responses() {
    let engine = DebateEngine::builder()
        .config(EngineConfig::default().with_exit_criteria(ExitCriteria::disabled()))
        .build()
        .unwrap();
    let mocks: Vec<Arc<MockWorker>> = ["first", "second", "third"]
        .iter()
        .map(|id| Arc::new(MockWorker::new(id, &["pos"])))
        .collect();
    let participants = workers(&mocks);

    let session = engine
        .start_session("Order", DebateMode::Adversarial, &participants, 1)
        .await
        .unwrap();
    let rounds = engine
        .execute_rounds(&participants, &session.id, 1, None, Vec::new())
        .await
        .unwrap();

    let ids: Vec<&str> = rounds[0].responses.iter().map(|r| r.agent_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
    assert_eq!(*mocks[0].visible.lock().unwrap(), vec![0]);
    assert_eq!(*mocks[1].visible.lock().unwrap(), vec![1]);
    assert_eq!(*mocks[2].visible.lock().unwrap(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_context_handshake_across_calls() {
    let engine = DebateEngine::builder()
        .config(EngineConfig::default().with_exit_criteria(ExitCriteria::disabled()))
        .build()
        .unwrap();
    let asker = Arc::new(MockWorker::new("asker", &[SHARED]).needing("current error budget"));
    let other = Arc::new(MockWorker::new("other", &[SHARED]));
    let participants = workers(&[asker.clone(), other]);

    let session = engine
        .start_session("Release plan", DebateMode::DevilsAdvocate, &participants, 2)
        .await
        .unwrap();

    let first = engine
        .execute_rounds(&participants, &session.id, 2, None, Vec::new())
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].status, RoundStatus::NeedsContext);
    let request = first[0].required_requests().next().unwrap().clone();
    assert_eq!(request.agent_id, "asker");
    assert_eq!(request.query, "current error budget");

    let answers = vec![ContextResult::answering(&request, "12 minutes left this month")];
    let second = engine
        .execute_rounds(&participants, &session.id, 2, Some("Ship or wait?"), answers)
        .await
        .unwrap();

    assert_eq!(second.len(), 2);
    assert_eq!(
        second.iter().map(|r| r.round_number).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(second.iter().all(|r| r.status == RoundStatus::Completed));

    // Answers reach the first round of the call only; by then nothing blocks.
    let seen = asker.answers_seen.lock().unwrap().clone();
    assert_eq!(seen[1], vec!["12 minutes left this month".to_string()]);
    assert!(seen[2].is_empty());

    let stored = engine.get_session(&session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_session() {
    let engine = DebateEngine::builder()
        .config(
            EngineConfig::default()
                .with_exit_criteria(ExitCriteria::disabled())
                .with_retry(RetryPolicy::default().with_max_attempts(3)),
        )
        .build()
        .unwrap();
    let steady = Arc::new(MockWorker::new("steady", &[SHARED]));
    let flaky = Arc::new(MockWorker::new("flaky", &[SHARED]).failing(vec![
        WorkerError::Transient("502".to_string()),
        WorkerError::Transient("502".to_string()),
        WorkerError::Transient("502".to_string()),
    ]));
    let participants = workers(&[steady, flaky.clone()]);

    let session = engine
        .start_session("Release plan", DebateMode::ExpertPanel, &participants, 3)
        .await
        .unwrap();
    let err = engine
        .execute_rounds(&participants, &session.id, 3, None, Vec::new())
        .await
        .unwrap_err();

    match &err {
        EngineError::RoundFailed { round, source } => {
            assert_eq!(*round, 1);
            assert_eq!(source.agent_id, "flaky");
            assert_eq!(source.attempts, 3);
            assert!(source.exhausted_retries);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);

    let stored = engine.get_session(&session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Error);
    assert!(stored.rounds.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_delays_but_does_not_fail() {
    let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default().with_provider(
        "deepseek",
        BucketConfig::new(2, 1, 1000),
    )));
    let engine = DebateEngine::builder()
        .config(EngineConfig::default().with_exit_criteria(ExitCriteria::disabled()))
        .limiter(limiter)
        .build()
        .unwrap();
    let mocks: Vec<Arc<MockWorker>> = ["x", "y", "z", "w"]
        .iter()
        .map(|id| Arc::new(MockWorker::new(id, &[SHARED]).on(Provider::DeepSeek)))
        .collect();
    let participants = workers(&mocks);

    let session = engine
        .start_session("Throttle", DebateMode::Collaborative, &participants, 1)
        .await
        .unwrap();

    let start = tokio::time::Instant::now();
    let rounds = engine
        .execute_rounds(&participants, &session.id, 1, None, Vec::new())
        .await
        .unwrap();

    assert_eq!(rounds[0].responses.len(), 4);
    // Two calls go through at once, the other two wait one refill interval each.
    assert!(start.elapsed() >= Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_between_calls() {
    let (tx, mut rx) = mpsc::channel(128);
    let engine = DebateEngine::builder()
        .config(EngineConfig::default().with_exit_criteria(ExitCriteria::disabled()))
        .event_sender(tx)
        .build()
        .unwrap();
    let participants = workers(&[Arc::new(MockWorker::new("solo", &[SHARED]))]);

    let session = engine
        .start_session("Pause", DebateMode::Socratic, &participants, 2)
        .await
        .unwrap();
    engine
        .execute_rounds(&participants, &session.id, 1, None, Vec::new())
        .await
        .unwrap();

    engine.pause_session(&session.id, "review").await.unwrap();
    let err = engine
        .execute_rounds(&participants, &session.id, 1, None, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotActive { .. }));

    engine.resume_session(&session.id, "reviewed").await.unwrap();
    let rounds = engine
        .execute_rounds(&participants, &session.id, 5, None, Vec::new())
        .await
        .unwrap();
    assert_eq!(rounds.len(), 1);
    assert_eq!(rounds[0].round_number, 2);

    drop(engine);
    let mut started = 0;
    let mut completed = 0;
    while let Some(event) = rx.recv().await {
        assert_eq!(event.session_id(), session.id);
        match event {
            DebateEvent::RoundStarted { .. } => started += 1,
            DebateEvent::SessionCompleted { rounds_completed, .. } => {
                completed += 1;
                assert_eq!(rounds_completed, 2);
            }
            _ => {}
        }
    }
    assert_eq!(started, 2);
    assert_eq!(completed, 1);
}

struct BrokenStrategy;

#[async_trait]
impl ConsensusStrategy for BrokenStrategy {
    fn name(&self) -> &str {
        "broken"
    }

    async fn assess(
        &self,
        _topic: &str,
        _responses: &[AgentResponse],
    ) -> Result<ConsensusAssessment, ConsensusStrategyError> {
        Err(ConsensusStrategyError::Transport("offline".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_failing_consensus_strategy_falls_back_to_heuristic() {
    let engine = DebateEngine::builder()
        .config(EngineConfig::default().with_exit_criteria(ExitCriteria::disabled()))
        .consensus_strategy(Arc::new(BrokenStrategy))
        .build()
        .unwrap();
    let participants = workers(&[
        Arc::new(MockWorker::new("a", &[SHARED])),
        Arc::new(MockWorker::new("b", &[SHARED])),
    ]);

    let session = engine
        .start_session("Fallback", DebateMode::Synthesis, &participants, 1)
        .await
        .unwrap();
    let rounds = engine
        .execute_rounds(&participants, &session.id, 1, None, Vec::new())
        .await
        .unwrap();

    let consensus = &rounds[0].consensus;
    assert_eq!(consensus.analyzer.as_deref(), Some("heuristic"));
    assert!(consensus.agreement_level > 0.9);
}
