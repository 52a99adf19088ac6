//! The round orchestrator.
//!
//! `DebateEngine::execute_rounds` runs up to N rounds of a stored session:
//! it picks the topology for the session's mode, drives every participant
//! through the rate-limited, retried invoker, scores the round, applies the
//! exit criteria and commits the session back to the store.
//!
//! A round is atomic. If any participant fails for good, nothing from the
//! round is recorded and the session moves to `error`. If a participant
//! raises a required context request, the round is returned as
//! `needs_context`, not recorded, and the next call must answer it.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::context::RoundToolkit;
use super::events::DebateEvent;
use super::session::{Session, SessionStatus};
use super::store::{InMemorySessionStore, SessionStore};
use super::types::{ContextResult, DebateMode, RoundContext, RoundResult, RoundStatus};
use crate::agents::{Worker, WorkerInvoker};
use crate::config::EngineConfig;
use crate::consensus::{ConsensusEvaluator, ConsensusStrategy, ExitCriteria};
use crate::error::{EngineError, EngineResult};
use crate::llm::RateLimiter;

/// Multi-round debate engine.
pub struct DebateEngine {
    invoker: WorkerInvoker,
    evaluator: ConsensusEvaluator,
    exit_criteria: ExitCriteria,
    store: Arc<dyn SessionStore>,
    event_tx: Option<mpsc::Sender<DebateEvent>>,
}

impl DebateEngine {
    /// Starts building an engine.
    pub fn builder() -> DebateEngineBuilder {
        DebateEngineBuilder::new()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.invoker.limiter()
    }

    pub fn exit_criteria(&self) -> &ExitCriteria {
        &self.exit_criteria
    }

    async fn emit(&self, event: DebateEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Creates and stores a new active session for `participants`.
    ///
    /// # Errors
    ///
    /// Fails on an empty or duplicated participant list, zero rounds, or a
    /// store error.
    pub async fn start_session(
        &self,
        topic: impl Into<String>,
        mode: DebateMode,
        participants: &[Arc<dyn Worker>],
        total_rounds: u32,
    ) -> EngineResult<Session> {
        if participants.is_empty() {
            return Err(EngineError::NoParticipants);
        }
        if total_rounds == 0 {
            return Err(EngineError::InvalidRequest(
                "a session needs at least one round".to_string(),
            ));
        }

        let ids = participant_ids(participants);
        let mut unique = HashSet::new();
        if let Some(duplicate) = ids.iter().find(|id| !unique.insert(id.as_str())) {
            return Err(EngineError::InvalidRequest(format!(
                "duplicate participant id '{}'",
                duplicate
            )));
        }

        let session = Session::new(topic, mode, ids, total_rounds);
        self.store.create(session.clone()).await?;

        tracing::info!(
            session_id = %session.id,
            mode = %mode,
            participants = participants.len(),
            total_rounds = total_rounds,
            "Session started"
        );
        Ok(session)
    }

    /// Loads a session from the store.
    pub async fn get_session(&self, session_id: &str) -> EngineResult<Session> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// Pauses an active session.
    pub async fn pause_session(&self, session_id: &str, reason: &str) -> EngineResult<Session> {
        let mut session = self.get_session(session_id).await?;
        session.pause(reason)?;
        self.store.update(&session).await?;
        tracing::info!(session_id = %session.id, reason = reason, "Session paused");
        Ok(session)
    }

    /// Resumes a paused session.
    pub async fn resume_session(&self, session_id: &str, reason: &str) -> EngineResult<Session> {
        let mut session = self.get_session(session_id).await?;
        session.resume(reason)?;
        self.store.update(&session).await?;
        tracing::info!(session_id = %session.id, reason = reason, "Session resumed");
        Ok(session)
    }

    /// Runs up to `number_of_rounds` rounds of a session.
    ///
    /// `participants` must match the session's participant ids in order.
    /// `supplied_context` must answer every required context request left by
    /// the previous call; it is injected into the first round run here.
    ///
    /// Stops early when the session completes (all rounds done or exit
    /// criteria met) or a round needs context; the blocked round is the last
    /// element of the result.
    ///
    /// # Errors
    ///
    /// - `NoParticipants`, `ParticipantMismatch`, `SessionNotFound`
    /// - `SessionNotActive` when the session is paused or terminal
    /// - `ContextRequired` when pending requests are unanswered (nothing changes)
    /// - `RoundFailed` when a participant fails for good (the session moves to error)
    pub async fn execute_rounds(
        &self,
        participants: &[Arc<dyn Worker>],
        session_id: &str,
        number_of_rounds: u32,
        focus_question: Option<&str>,
        supplied_context: Vec<ContextResult>,
    ) -> EngineResult<Vec<RoundResult>> {
        if participants.is_empty() {
            return Err(EngineError::NoParticipants);
        }

        let mut session = self.get_session(session_id).await?;

        let ids = participant_ids(participants);
        if ids != session.participants {
            return Err(EngineError::ParticipantMismatch {
                expected: session.participants.clone(),
                actual: ids,
            });
        }

        if !session.is_active() {
            return Err(EngineError::SessionNotActive {
                session_id: session.id.clone(),
                status: session.status,
            });
        }

        let answered: HashSet<&str> = supplied_context
            .iter()
            .map(|c| c.request_id.as_str())
            .collect();
        let missing: Vec<String> = session
            .pending_context_requests
            .iter()
            .filter(|r| r.is_required() && !answered.contains(r.id.as_str()))
            .map(|r| r.id.clone())
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                session_id = %session.id,
                missing = missing.len(),
                "Rejecting rounds: required context not supplied"
            );
            return Err(EngineError::ContextRequired { missing });
        }

        let topology = session.mode.topology();
        let mut supplied = Some(Arc::new(supplied_context));
        let mut results = Vec::new();

        for _ in 0..number_of_rounds {
            if !session.has_rounds_remaining() {
                break;
            }

            let round_number = session.current_round + 1;
            tracing::info!(
                session_id = %session.id,
                round = round_number,
                topology = %topology,
                "Round started"
            );
            self.emit(DebateEvent::round_started(
                &session.id,
                round_number,
                participants.len(),
            ))
            .await;

            let context = RoundContext {
                session_id: session.id.clone(),
                topic: session.topic.clone(),
                mode: session.mode,
                round_number,
                total_rounds: session.total_rounds,
                focus_question: focus_question.map(str::to_string),
                previous_rounds: Arc::new(session.rounds.clone()),
                current_round: Vec::new(),
                supplied_context: supplied.take().unwrap_or_default(),
            };

            let toolkit = RoundToolkit::new();
            let responses = match topology
                .execute_round(participants, &context, &self.invoker, &toolkit)
                .await
            {
                Ok(responses) => responses,
                Err(source) => {
                    tracing::error!(
                        session_id = %session.id,
                        round = round_number,
                        agent_id = %source.agent_id,
                        kind = %source.kind(),
                        error = %source,
                        "Round failed"
                    );
                    session.fail(&format!("round {} failed: {}", round_number, source))?;
                    self.store.update(&session).await?;
                    self.emit(DebateEvent::round_failed(
                        &session.id,
                        round_number,
                        source.to_string(),
                    ))
                    .await;
                    self.emit(DebateEvent::session_completed(
                        &session.id,
                        SessionStatus::Error,
                        session.current_round,
                        false,
                    ))
                    .await;
                    return Err(EngineError::RoundFailed {
                        round: round_number,
                        source,
                    });
                }
            };

            for response in &responses {
                self.emit(DebateEvent::agent_responded(
                    &session.id,
                    round_number,
                    &response.agent_id,
                    response.confidence,
                ))
                .await;
            }

            let context_requests = toolkit.drain();
            let consensus = self.evaluator.evaluate(&session.topic, &responses).await;

            let required: Vec<_> = context_requests
                .iter()
                .filter(|r| r.is_required())
                .cloned()
                .collect();

            if !required.is_empty() {
                let request_ids: Vec<String> = required.iter().map(|r| r.id.clone()).collect();
                tracing::info!(
                    session_id = %session.id,
                    round = round_number,
                    requests = required.len(),
                    "Round needs context"
                );

                session.await_context(required);
                self.store.update(&session).await?;
                self.emit(DebateEvent::context_requested(
                    &session.id,
                    round_number,
                    request_ids,
                ))
                .await;

                results.push(RoundResult {
                    round_number,
                    responses,
                    consensus,
                    status: RoundStatus::NeedsContext,
                    context_requests,
                });
                break;
            }

            let round = RoundResult {
                round_number,
                responses,
                consensus,
                status: RoundStatus::Completed,
                context_requests,
            };
            let agreement = round.consensus.agreement_level;

            session.record_round(round.clone())?;
            let exit_met = session.convergence.record(&self.exit_criteria, agreement);

            self.emit(DebateEvent::consensus_check(
                &session.id,
                round_number,
                agreement,
                self.exit_criteria.enabled && self.exit_criteria.qualifies(agreement),
            ))
            .await;

            if exit_met {
                session.complete(&format!(
                    "exit criteria met after {} consecutive round(s)",
                    session.convergence.consecutive()
                ))?;
            } else if !session.has_rounds_remaining() {
                session.complete("all rounds completed")?;
            }

            self.store.update(&session).await?;
            tracing::info!(
                session_id = %session.id,
                round = round_number,
                agreement = agreement,
                level = %round.consensus.level,
                "Round completed"
            );
            results.push(round);

            if session.status == SessionStatus::Completed {
                tracing::info!(
                    session_id = %session.id,
                    rounds = session.current_round,
                    early_exit = exit_met,
                    "Session completed"
                );
                self.emit(DebateEvent::session_completed(
                    &session.id,
                    SessionStatus::Completed,
                    session.current_round,
                    exit_met,
                ))
                .await;
                break;
            }
        }

        Ok(results)
    }
}

impl std::fmt::Debug for DebateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebateEngine")
            .field("invoker", &self.invoker)
            .field("evaluator", &self.evaluator)
            .field("exit_criteria", &self.exit_criteria)
            .finish()
    }
}

fn participant_ids(participants: &[Arc<dyn Worker>]) -> Vec<String> {
    participants.iter().map(|w| w.id().to_string()).collect()
}

/// Builder for `DebateEngine`.
#[derive(Default)]
pub struct DebateEngineBuilder {
    config: EngineConfig,
    limiter: Option<Arc<RateLimiter>>,
    store: Option<Arc<dyn SessionStore>>,
    consensus_strategy: Option<Arc<dyn ConsensusStrategy>>,
    event_tx: Option<mpsc::Sender<DebateEvent>>,
}

impl DebateEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing rate limiter instead of creating one from the config.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Sets the session store (in-memory by default).
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Prefers `strategy` over the heuristic for rounds with two or more responses.
    pub fn consensus_strategy(mut self, strategy: Arc<dyn ConsensusStrategy>) -> Self {
        self.consensus_strategy = Some(strategy);
        self
    }

    /// Sends progress events on `tx`.
    pub fn event_sender(mut self, tx: mpsc::Sender<DebateEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` if the configuration is invalid.
    pub fn build(self) -> EngineResult<DebateEngine> {
        self.config.validate()?;

        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(self.config.rate_limits.clone())));
        let invoker = WorkerInvoker::new(limiter, self.config.retry.clone(), self.config.tokens_per_call);

        let mut evaluator = ConsensusEvaluator::new(self.config.consensus);
        if let Some(strategy) = self.consensus_strategy {
            evaluator = evaluator.with_strategy(strategy);
        }

        Ok(DebateEngine {
            invoker,
            evaluator,
            exit_criteria: self.config.exit_criteria,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemorySessionStore::new())),
            event_tx: self.event_tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedWorker;
    use crate::agents::WorkerError;
    use crate::debate::types::ContextPriority;
    use crate::error::ErrorKind;
    use crate::llm::RetryPolicy;

    const AGREE: &str = "Adopt Rust for the ingestion service";

    fn engine(exit_criteria: ExitCriteria) -> DebateEngine {
        DebateEngine::builder()
            .config(
                EngineConfig::default()
                    .with_exit_criteria(exit_criteria)
                    .with_retry(RetryPolicy::default().with_max_attempts(2)),
            )
            .build()
            .unwrap()
    }

    fn as_workers(scripted: &[Arc<ScriptedWorker>]) -> Vec<Arc<dyn Worker>> {
        scripted
            .iter()
            .map(|w| w.clone() as Arc<dyn Worker>)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_all_rounds_and_completes() {
        let engine = engine(ExitCriteria::disabled());
        let workers = as_workers(&[
            Arc::new(ScriptedWorker::new("a", AGREE)),
            Arc::new(ScriptedWorker::new("b", AGREE)),
        ]);
        let session = engine
            .start_session("Rust?", DebateMode::Collaborative, &workers, 3)
            .await
            .unwrap();

        let rounds = engine
            .execute_rounds(&workers, &session.id, 5, None, Vec::new())
            .await
            .unwrap();

        assert_eq!(rounds.len(), 3);
        assert_eq!(
            rounds.iter().map(|r| r.round_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        let stored = engine.get_session(&session.id).await.unwrap();
        assert_eq!(stored.current_round, 3);
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.rounds.len(), 3);
        assert_eq!(stored.responses().count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_run_keeps_session_active() {
        let engine = engine(ExitCriteria::disabled());
        let workers = as_workers(&[Arc::new(ScriptedWorker::new("a", AGREE))]);
        let session = engine
            .start_session("Rust?", DebateMode::Adversarial, &workers, 4)
            .await
            .unwrap();

        engine
            .execute_rounds(&workers, &session.id, 1, Some("cost?"), Vec::new())
            .await
            .unwrap();
        let stored = engine.get_session(&session.id).await.unwrap();
        assert_eq!(stored.current_round, 1);
        assert_eq!(stored.status, SessionStatus::Active);

        let rounds = engine
            .execute_rounds(&workers, &session.id, 2, None, Vec::new())
            .await
            .unwrap();
        assert_eq!(rounds[0].round_number, 2);
        assert_eq!(engine.get_session(&session.id).await.unwrap().current_round, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_criteria_fire_after_round_four() {
        let engine = engine(ExitCriteria::new(0.9, 2));
        let a = Arc::new(ScriptedWorker::new("a", "").with_positions(&[
            "Expand nuclear power",
            "Invest in offshore wind farms",
            AGREE,
            AGREE,
            AGREE,
        ]));
        let b = Arc::new(ScriptedWorker::new("b", "").with_positions(&[
            "Subsidize rooftop solar panels",
            "Build more natural gas plants",
            AGREE,
            AGREE,
            AGREE,
        ]));
        let workers = as_workers(&[a, b]);
        let session = engine
            .start_session("Energy", DebateMode::ExpertPanel, &workers, 6)
            .await
            .unwrap();

        let rounds = engine
            .execute_rounds(&workers, &session.id, 6, None, Vec::new())
            .await
            .unwrap();

        assert_eq!(rounds.len(), 4);
        assert!(rounds[0].consensus.agreement_level < 0.9);
        assert!(rounds[1].consensus.agreement_level < 0.9);
        assert!(rounds[2].consensus.agreement_level >= 0.9);
        assert!(rounds[3].consensus.agreement_level >= 0.9);

        let stored = engine.get_session(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.current_round, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opposing_stances_block_early_exit() {
        let engine = engine(ExitCriteria::new(0.9, 1));
        let pro = Arc::new(ScriptedWorker::new("pro", AGREE).with_stance("for").with_confidence(0.9));
        let con = Arc::new(
            ScriptedWorker::new("con", AGREE)
                .with_stance("against")
                .with_confidence(0.3),
        );
        let workers = as_workers(&[pro, con]);
        let session = engine
            .start_session("Rust?", DebateMode::Adversarial, &workers, 2)
            .await
            .unwrap();

        let rounds = engine
            .execute_rounds(&workers, &session.id, 2, None, Vec::new())
            .await
            .unwrap();

        assert_eq!(rounds.len(), 2);
        assert!(rounds[0].consensus.agreement_level < 0.9);
        assert!(!rounds[0].consensus.disagreement_points.is_empty());
        let stored = engine.get_session(&session.id).await.unwrap();
        assert_eq!(stored.convergence.consecutive(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_failure_moves_session_to_error() {
        let engine = engine(ExitCriteria::disabled());
        let ok = Arc::new(ScriptedWorker::new("ok", AGREE));
        let broken = Arc::new(
            ScriptedWorker::new("broken", AGREE)
                .failing_with(vec![WorkerError::Fatal("invalid api key".to_string())]),
        );
        let workers = as_workers(&[ok, broken]);
        let session = engine
            .start_session("Rust?", DebateMode::Collaborative, &workers, 3)
            .await
            .unwrap();

        let err = engine
            .execute_rounds(&workers, &session.id, 3, None, Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::RoundFailed { round: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Fatal);

        let stored = engine.get_session(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Error);
        assert_eq!(stored.current_round, 0);
        assert!(stored.rounds.is_empty());

        let err = engine
            .execute_rounds(&workers, &session.id, 1, None, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionNotActive { status: SessionStatus::Error, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_within_round() {
        let engine = engine(ExitCriteria::disabled());
        let flaky = Arc::new(
            ScriptedWorker::new("flaky", AGREE)
                .failing_with(vec![WorkerError::Transient("503".to_string())]),
        );
        let workers = as_workers(&[flaky.clone()]);
        let session = engine
            .start_session("Rust?", DebateMode::Socratic, &workers, 1)
            .await
            .unwrap();

        let rounds = engine
            .execute_rounds(&workers, &session.id, 1, None, Vec::new())
            .await
            .unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_needs_context_handshake() {
        let engine = engine(ExitCriteria::disabled());
        let asker = Arc::new(
            ScriptedWorker::new("asker", AGREE)
                .requesting("Q3 revenue figures", ContextPriority::Required),
        );
        let other = Arc::new(ScriptedWorker::new("other", AGREE));
        let workers = as_workers(&[asker, other]);
        let session = engine
            .start_session("Budget", DebateMode::Synthesis, &workers, 3)
            .await
            .unwrap();

        let rounds = engine
            .execute_rounds(&workers, &session.id, 3, None, Vec::new())
            .await
            .unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].status, RoundStatus::NeedsContext);
        assert_eq!(rounds[0].round_number, 1);
        let request = rounds[0].required_requests().next().unwrap().clone();

        let stored = engine.get_session(&session.id).await.unwrap();
        assert_eq!(stored.current_round, 0);
        assert!(stored.rounds.is_empty());
        assert_eq!(stored.pending_context_requests.len(), 1);

        // Without an answer the call is rejected and nothing changes.
        let err = engine
            .execute_rounds(&workers, &session.id, 1, None, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ContextRequired { ref missing } if missing == &vec![request.id.clone()]));
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(engine.get_session(&session.id).await.unwrap().pending_context_requests.len(), 1);

        let rounds = engine
            .execute_rounds(
                &workers,
                &session.id,
                1,
                None,
                vec![ContextResult::answering(&request, "$4.2M")],
            )
            .await
            .unwrap();
        assert_eq!(rounds[0].status, RoundStatus::Completed);
        assert_eq!(rounds[0].round_number, 1);

        let stored = engine.get_session(&session.id).await.unwrap();
        assert_eq!(stored.current_round, 1);
        assert!(stored.pending_context_requests.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_optional_requests_never_block() {
        let engine = engine(ExitCriteria::disabled());
        let asker = Arc::new(
            ScriptedWorker::new("asker", AGREE).requesting("nice to know", ContextPriority::Optional),
        );
        let workers = as_workers(&[asker]);
        let session = engine
            .start_session("Budget", DebateMode::Delphi, &workers, 2)
            .await
            .unwrap();

        let rounds = engine
            .execute_rounds(&workers, &session.id, 2, None, Vec::new())
            .await
            .unwrap();
        assert_eq!(rounds.len(), 2);
        assert!(rounds.iter().all(|r| r.status == RoundStatus::Completed));
        assert_eq!(rounds[0].context_requests.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_session_rejects_rounds_until_resumed() {
        let engine = engine(ExitCriteria::disabled());
        let workers = as_workers(&[Arc::new(ScriptedWorker::new("a", AGREE))]);
        let session = engine
            .start_session("Rust?", DebateMode::Collaborative, &workers, 2)
            .await
            .unwrap();

        engine.pause_session(&session.id, "lunch").await.unwrap();
        let err = engine
            .execute_rounds(&workers, &session.id, 1, None, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionNotActive { status: SessionStatus::Paused, .. }));

        let err = engine.pause_session(&session.id, "again").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));

        engine.resume_session(&session.id, "back").await.unwrap();
        let rounds = engine
            .execute_rounds(&workers, &session.id, 1, None, Vec::new())
            .await
            .unwrap();
        assert_eq!(rounds.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_participant_validation() {
        let engine = engine(ExitCriteria::disabled());
        let a = Arc::new(ScriptedWorker::new("a", AGREE));
        let b = Arc::new(ScriptedWorker::new("b", AGREE));
        let workers = as_workers(&[a.clone(), b.clone()]);
        let session = engine
            .start_session("Rust?", DebateMode::Collaborative, &workers, 2)
            .await
            .unwrap();

        let err = engine
            .execute_rounds(&[], &session.id, 1, None, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoParticipants));

        let reversed = as_workers(&[b, a.clone()]);
        let err = engine
            .execute_rounds(&reversed, &session.id, 1, None, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ParticipantMismatch { .. }));

        let err = engine
            .execute_rounds(&workers, "missing", 1, None, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));

        let duplicated = as_workers(&[a.clone(), a]);
        let err = engine
            .start_session("Rust?", DebateMode::Collaborative, &duplicated, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_are_emitted() {
        let (tx, mut rx) = mpsc::channel(64);
        let engine = DebateEngine::builder()
            .config(EngineConfig::default().with_exit_criteria(ExitCriteria::disabled()))
            .event_sender(tx)
            .build()
            .unwrap();
        let workers = as_workers(&[Arc::new(ScriptedWorker::new("a", AGREE))]);
        let session = engine
            .start_session("Rust?", DebateMode::Collaborative, &workers, 1)
            .await
            .unwrap();

        engine
            .execute_rounds(&workers, &session.id, 1, None, Vec::new())
            .await
            .unwrap();
        drop(engine);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(DebateEvent::RoundStarted { round: 1, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, DebateEvent::AgentResponded { .. })));
        assert!(matches!(
            events.last(),
            Some(DebateEvent::SessionCompleted { status: SessionStatus::Completed, early_exit: false, .. })
        ));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = DebateEngine::builder()
            .config(EngineConfig::default().with_tokens_per_call(0))
            .build();
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
