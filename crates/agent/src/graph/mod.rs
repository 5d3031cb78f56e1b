//! The reasoning graph: draft once, then critique and refine until a
//! termination rule fires.
//!
//! ```text
//! reason ─► critique ─┬─ accept ───────────► Accepted
//!              ▲      ├─ budget spent ─────► MaxRounds
//!              │      ├─ no improvement ───► NoImprovement
//!              │      └─ revise
//!              │            │
//!              └─ refine ◄──┘  (cancellation checked here)
//! ```
//!
//! A session runs its rounds strictly in sequence. The graph itself holds no
//! per-session data, so one instance can drive many sessions concurrently.

pub mod config;
pub mod failure;
pub mod policy;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use cogloop_core::error::AgentError;
use cogloop_core::event::{DomainEvent, EventBus, preview};
use cogloop_core::state::{ReasoningState, SessionId, TerminationReason};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::{AgentRole, CriticAgent, ReasonerAgent, RefinerAgent};

pub use config::{ConfigurationError, GraphConfig, RetryPolicy};
pub use failure::{FailureCause, SessionFailure};
pub use policy::Decision;

const PREVIEW_CHARS: usize = 120;

/// Drives the reasoner, critic, and refiner through one session per `run`.
pub struct ReasoningGraph {
    reasoner: Arc<dyn ReasonerAgent>,
    critic: Arc<dyn CriticAgent>,
    refiner: Arc<dyn RefinerAgent>,
    event_bus: Option<Arc<EventBus>>,
}

impl ReasoningGraph {
    pub fn new(
        reasoner: Arc<dyn ReasonerAgent>,
        critic: Arc<dyn CriticAgent>,
        refiner: Arc<dyn RefinerAgent>,
    ) -> Self {
        Self {
            reasoner,
            critic,
            refiner,
            event_bus: None,
        }
    }

    /// Publish loop transitions to `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Run one session to completion.
    pub async fn run(
        &self,
        query: impl Into<String>,
        config: &GraphConfig,
    ) -> Result<ReasoningState, SessionFailure> {
        self.run_with_cancel(query, config, CancellationToken::new())
            .await
    }

    /// Run one session, stopping between rounds once `cancel` fires.
    ///
    /// `Ok` states always end in `Accepted`, `MaxRounds`, or
    /// `NoImprovement`. Anything else, cancellation included, comes back as
    /// a [`SessionFailure`] carrying the partial transcript.
    pub async fn run_with_cancel(
        &self,
        query: impl Into<String>,
        config: &GraphConfig,
        cancel: CancellationToken,
    ) -> Result<ReasoningState, SessionFailure> {
        let mut state = ReasoningState::new(query);

        if let Err(e) = config.validate() {
            warn!(session_id = %state.session_id(), error = %e, "Rejecting graph configuration");
            return Err(self.fail(state, e.into()));
        }

        info!(
            session_id = %state.session_id(),
            max_rounds = config.max_rounds,
            stagnation_window = ?config.stagnation_window,
            "Reasoning session started"
        );
        self.publish(DomainEvent::SessionStarted {
            session_id: state.session_id().to_string(),
            query_preview: preview(state.query(), PREVIEW_CHARS),
            max_rounds: config.max_rounds,
            timestamp: Utc::now(),
        });

        let reason = match self.drive(&mut state, config, &cancel).await {
            Ok(reason) => reason,
            Err(cause) => return Err(self.fail(state, cause)),
        };
        if let Err(e) = state.terminate(reason) {
            return Err(self.fail(state, e.into()));
        }

        info!(
            session_id = %state.session_id(),
            reason = %reason,
            rounds = state.rounds().len(),
            "Reasoning session finished"
        );
        self.publish_terminated(&state, reason);
        Ok(state)
    }

    /// The loop body. Returns the non-error termination reason, leaving the
    /// state live so the caller terminates it exactly once.
    async fn drive(
        &self,
        state: &mut ReasoningState,
        config: &GraphConfig,
        cancel: &CancellationToken,
    ) -> Result<TerminationReason, FailureCause> {
        if cancel.is_cancelled() {
            return Err(FailureCause::Cancelled);
        }

        let mut candidate = {
            let view = &*state;
            self.invoke(AgentRole::Reasoner, view.session_id(), config, cancel, || {
                self.reasoner.reason(view)
            })
            .await?
        };

        loop {
            let index = state.begin_round(candidate.as_str())?;
            debug!(session_id = %state.session_id(), round = index, "Round started");
            self.publish(DomainEvent::RoundStarted {
                session_id: state.session_id().to_string(),
                round: index,
                candidate_preview: preview(&candidate, PREVIEW_CHARS),
                timestamp: Utc::now(),
            });

            let critique = {
                let view = &*state;
                self.invoke(AgentRole::Critic, view.session_id(), config, cancel, || {
                    self.critic.critique(view, &candidate)
                })
                .await?
            };
            state.record_critique(critique.clone())?;

            debug!(
                session_id = %state.session_id(),
                round = index,
                verdict = %critique.verdict,
                confidence = critique.confidence,
                reasons = critique.reasons.len(),
                "Critique recorded"
            );
            self.publish(DomainEvent::CritiqueRecorded {
                session_id: state.session_id().to_string(),
                round: index,
                verdict: critique.verdict,
                confidence: critique.confidence,
                timestamp: Utc::now(),
            });

            if let Decision::Terminate(reason) =
                policy::decide(config, index, &critique, &state.confidences())
            {
                return Ok(reason);
            }

            if cancel.is_cancelled() {
                info!(session_id = %state.session_id(), round = index, "Cancellation requested between rounds");
                return Err(FailureCause::Cancelled);
            }

            let revised = {
                let view = &*state;
                self.invoke(AgentRole::Refiner, view.session_id(), config, cancel, || {
                    self.refiner.refine(view, &candidate, &critique)
                })
                .await?
            };
            candidate = revised;
        }
    }

    /// Call an agent under the per-call timeout, retrying failures with
    /// backoff until the retry budget is spent.
    async fn invoke<T, F, Fut>(
        &self,
        role: AgentRole,
        session_id: &SessionId,
        config: &GraphConfig,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, FailureCause>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match tokio::time::timeout(config.per_call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => role.timeout(config.per_call_timeout),
            };

            if attempt >= config.retry.max_retries {
                warn!(
                    session_id = %session_id,
                    agent = %role,
                    attempts = attempt + 1,
                    error = %error,
                    "Agent call failed"
                );
                return Err(error.into());
            }

            let delay = config.retry.delay_for(attempt);
            attempt += 1;
            warn!(
                session_id = %session_id,
                agent = %role,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Agent call failed, retrying"
            );
            self.publish(DomainEvent::AgentRetried {
                session_id: session_id.to_string(),
                agent: role.as_str().to_string(),
                attempt,
                error_message: error.to_string(),
                timestamp: Utc::now(),
            });

            tokio::select! {
                _ = cancel.cancelled() => return Err(FailureCause::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn fail(&self, mut state: ReasoningState, cause: FailureCause) -> SessionFailure {
        let reason = TerminationReason::Error { kind: cause.kind() };
        // Terminating only fails on an already-terminal state.
        let _ = state.terminate(reason);

        warn!(
            session_id = %state.session_id(),
            reason = %reason,
            rounds = state.rounds().len(),
            error = %cause,
            "Reasoning session failed"
        );
        self.publish_terminated(&state, reason);

        SessionFailure {
            cause,
            state: Box::new(state),
        }
    }

    fn publish_terminated(&self, state: &ReasoningState, reason: TerminationReason) {
        self.publish(DomainEvent::SessionTerminated {
            session_id: state.session_id().to_string(),
            reason,
            rounds: state.rounds().len(),
            timestamp: Utc::now(),
        });
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cogloop_core::state::{Critique, ErrorKind};

    use super::*;
    use crate::test_helpers::*;

    fn graph(
        reasoner: Arc<dyn ReasonerAgent>,
        critic: Arc<dyn CriticAgent>,
        refiner: Arc<dyn RefinerAgent>,
    ) -> ReasoningGraph {
        ReasoningGraph::new(reasoner, critic, refiner)
    }

    fn revise(confidence: f32) -> Critique {
        Critique::revise(vec!["not there yet".into()], confidence)
    }

    fn assert_contiguous(state: &ReasoningState) {
        for (i, round) in state.rounds().iter().enumerate() {
            assert_eq!(round.index, i);
        }
    }

    #[tokio::test]
    async fn accept_on_first_round() {
        let reasoner = Arc::new(ScriptedReasoner::answer("42"));
        let critic = Arc::new(ScriptedCritic::new(vec![Critique::accept(0.95)]));
        let refiner = Arc::new(ScriptedRefiner::new());
        let graph = graph(reasoner.clone(), critic.clone(), refiner.clone());

        let state = graph.run("meaning of life?", &GraphConfig::new(5)).await.unwrap();

        assert_eq!(state.rounds().len(), 1);
        assert_eq!(state.termination(), Some(TerminationReason::Accepted));
        assert!(state.rounds()[0].accepted);
        assert_eq!(state.final_answer(), Some("42"));
        assert_eq!(reasoner.call_count(), 1);
        assert_eq!(critic.call_count(), 1);
        assert_eq!(refiner.call_count(), 0);
    }

    #[tokio::test]
    async fn always_revise_exhausts_budget() {
        let refiner = Arc::new(ScriptedRefiner::new());
        let graph = graph(
            Arc::new(ScriptedReasoner::answer("draft")),
            Arc::new(ScriptedCritic::new(vec![revise(0.3)])),
            refiner.clone(),
        );

        let state = graph.run("q", &GraphConfig::new(3)).await.unwrap();

        assert_eq!(state.rounds().len(), 3);
        assert_eq!(state.termination(), Some(TerminationReason::MaxRounds));
        assert!(state.rounds().iter().all(|r| !r.accepted && !r.is_open()));
        assert_eq!(refiner.call_count(), 2);
        assert_eq!(state.rounds()[1].candidate, "revision 1");
        assert_eq!(state.final_answer(), Some("revision 2"));
        assert_contiguous(&state);
    }

    #[tokio::test]
    async fn accept_on_last_round_reports_accepted() {
        let graph = graph(
            Arc::new(ScriptedReasoner::answer("draft")),
            Arc::new(ScriptedCritic::new(vec![
                revise(0.2),
                revise(0.4),
                Critique::accept(0.8),
            ])),
            Arc::new(ScriptedRefiner::new()),
        );

        let state = graph.run("q", &GraphConfig::new(3)).await.unwrap();
        assert_eq!(state.rounds().len(), 3);
        assert_eq!(state.termination(), Some(TerminationReason::Accepted));
    }

    #[tokio::test]
    async fn failing_reasoner_fails_session_with_no_rounds() {
        let critic = Arc::new(ScriptedCritic::new(vec![Critique::accept(1.0)]));
        let graph = graph(
            Arc::new(ScriptedReasoner::failing("service unavailable")),
            critic.clone(),
            Arc::new(ScriptedRefiner::new()),
        );

        let failure = graph.run("q", &GraphConfig::new(3)).await.unwrap_err();

        assert_eq!(failure.kind(), ErrorKind::Generation);
        assert!(failure.agent_error().unwrap().is_generation());
        assert!(failure.state.rounds().is_empty());
        assert_eq!(
            failure.state.termination(),
            Some(TerminationReason::Error {
                kind: ErrorKind::Generation
            })
        );
        assert_eq!(critic.call_count(), 0);
    }

    #[tokio::test]
    async fn failing_critic_preserves_open_round() {
        let graph = graph(
            Arc::new(ScriptedReasoner::answer("draft")),
            Arc::new(ScriptedCritic::failing("judge offline")),
            Arc::new(ScriptedRefiner::new()),
        );

        let failure = graph.run("q", &GraphConfig::new(3)).await.unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Evaluation);

        let state = failure.into_state();
        assert_eq!(state.rounds().len(), 1);
        assert!(state.rounds()[0].is_open());
    }

    #[tokio::test]
    async fn stagnation_stops_flat_confidence() {
        let graph = graph(
            Arc::new(ScriptedReasoner::answer("draft")),
            Arc::new(ScriptedCritic::new(vec![revise(0.5)])),
            Arc::new(ScriptedRefiner::new()),
        );
        let config = GraphConfig::new(3).with_stagnation_window(2);

        let state = graph.run("q", &config).await.unwrap();

        assert_eq!(state.rounds().len(), 2);
        assert_eq!(state.termination(), Some(TerminationReason::NoImprovement));
        assert_eq!(state.confidences(), vec![0.5, 0.5]);
        assert_eq!(state.final_answer(), Some("revision 1"));
    }

    #[tokio::test]
    async fn improving_confidence_keeps_going() {
        let graph = graph(
            Arc::new(ScriptedReasoner::answer("draft")),
            Arc::new(ScriptedCritic::new(vec![
                revise(0.2),
                revise(0.3),
                revise(0.4),
                revise(0.5),
            ])),
            Arc::new(ScriptedRefiner::new()),
        );
        let config = GraphConfig::new(4).with_stagnation_window(2);

        let state = graph.run("q", &config).await.unwrap();
        assert_eq!(state.termination(), Some(TerminationReason::MaxRounds));
        assert_eq!(state.rounds().len(), 4);
    }

    #[tokio::test]
    async fn cancel_between_rounds_keeps_completed_round() {
        let cancel = CancellationToken::new();
        let refiner = Arc::new(ScriptedRefiner::new());
        let graph = graph(
            Arc::new(ScriptedReasoner::answer("draft")),
            Arc::new(ScriptedCritic::new(vec![revise(0.4)]).cancelling(cancel.clone(), 0)),
            refiner.clone(),
        );

        let failure = graph
            .run_with_cancel("q", &GraphConfig::new(5), cancel)
            .await
            .unwrap_err();

        assert!(failure.is_cancelled());
        assert_eq!(
            failure.state.termination(),
            Some(TerminationReason::Error {
                kind: ErrorKind::Cancelled
            })
        );
        assert_eq!(failure.state.completed_rounds().count(), 1);
        assert_eq!(refiner.call_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_calls_no_agent() {
        let reasoner = Arc::new(ScriptedReasoner::answer("draft"));
        let graph = graph(
            reasoner.clone(),
            Arc::new(ScriptedCritic::new(vec![Critique::accept(1.0)])),
            Arc::new(ScriptedRefiner::new()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = graph
            .run_with_cancel("q", &GraphConfig::new(5), cancel)
            .await
            .unwrap_err();
        assert!(failure.is_cancelled());
        assert!(failure.state.rounds().is_empty());
        assert_eq!(reasoner.call_count(), 0);
    }

    #[tokio::test]
    async fn accept_wins_over_pending_cancellation() {
        let cancel = CancellationToken::new();
        let graph = graph(
            Arc::new(ScriptedReasoner::answer("draft")),
            Arc::new(ScriptedCritic::new(vec![Critique::accept(0.9)]).cancelling(cancel.clone(), 0)),
            Arc::new(ScriptedRefiner::new()),
        );

        let state = graph
            .run_with_cancel("q", &GraphConfig::new(5), cancel)
            .await
            .unwrap();
        assert_eq!(state.termination(), Some(TerminationReason::Accepted));
    }

    #[tokio::test]
    async fn invalid_config_fails_before_any_agent() {
        let reasoner = Arc::new(ScriptedReasoner::answer("draft"));
        let graph = graph(
            reasoner.clone(),
            Arc::new(ScriptedCritic::new(vec![Critique::accept(1.0)])),
            Arc::new(ScriptedRefiner::new()),
        );

        let failure = graph.run("q", &GraphConfig::new(0)).await.unwrap_err();

        assert_eq!(
            failure.cause,
            FailureCause::Configuration(ConfigurationError::ZeroMaxRounds)
        );
        assert_eq!(failure.kind(), ErrorKind::Configuration);
        assert!(failure.state.rounds().is_empty());
        assert_eq!(reasoner.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_critic_times_out_as_evaluation_failure() {
        let graph = graph(
            Arc::new(ScriptedReasoner::answer("draft")),
            Arc::new(HangingCritic),
            Arc::new(ScriptedRefiner::new()),
        );
        let config = GraphConfig::new(3).with_per_call_timeout(Duration::from_secs(5));

        let failure = graph.run("q", &config).await.unwrap_err();

        assert_eq!(failure.kind(), ErrorKind::Evaluation);
        assert_eq!(
            failure.agent_error(),
            Some(&AgentError::Evaluation(
                "critic call timed out after 5000ms".into()
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_flaky_reasoner() {
        let reasoner = Arc::new(ScriptedReasoner::flaky(1, "draft"));
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let graph = graph(
            reasoner.clone(),
            Arc::new(ScriptedCritic::new(vec![Critique::accept(0.9)])),
            Arc::new(ScriptedRefiner::new()),
        )
        .with_event_bus(bus);
        let config = GraphConfig::new(3).with_retry(RetryPolicy::new(2, Duration::from_millis(100)));

        let state = graph.run("q", &config).await.unwrap();

        assert_eq!(state.termination(), Some(TerminationReason::Accepted));
        assert_eq!(reasoner.call_count(), 2);

        let mut retried = 0;
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::AgentRetried { agent, attempt, .. } = event.as_ref() {
                assert_eq!(agent, "reasoner");
                assert_eq!(*attempt, 1);
                retried += 1;
            }
        }
        assert_eq!(retried, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhausted_escalates() {
        let reasoner = Arc::new(ScriptedReasoner::failing("still down"));
        let graph = graph(
            reasoner.clone(),
            Arc::new(ScriptedCritic::new(vec![Critique::accept(0.9)])),
            Arc::new(ScriptedRefiner::new()),
        );
        let config = GraphConfig::new(3).with_retry(RetryPolicy::new(2, Duration::from_millis(100)));

        let failure = graph.run("q", &config).await.unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::Generation);
        assert_eq!(reasoner.call_count(), 3);
    }

    #[tokio::test]
    async fn events_trace_the_session() {
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let graph = graph(
            Arc::new(ScriptedReasoner::answer("draft")),
            Arc::new(ScriptedCritic::new(vec![revise(0.4), Critique::accept(0.9)])),
            Arc::new(ScriptedRefiner::new()),
        )
        .with_event_bus(bus);

        let state = graph.run("q", &GraphConfig::new(5)).await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(match event.as_ref() {
                DomainEvent::SessionStarted { .. } => "started",
                DomainEvent::RoundStarted { .. } => "round",
                DomainEvent::CritiqueRecorded { .. } => "critique",
                DomainEvent::AgentRetried { .. } => "retry",
                DomainEvent::SessionTerminated { session_id, rounds, reason, .. } => {
                    assert_eq!(session_id, &state.session_id().to_string());
                    assert_eq!(*rounds, 2);
                    assert_eq!(*reason, TerminationReason::Accepted);
                    "terminated"
                }
            });
        }
        assert_eq!(
            names,
            vec!["started", "round", "critique", "round", "critique", "terminated"]
        );
    }

    #[tokio::test]
    async fn concurrent_sessions_are_independent() {
        let graph = graph(
            Arc::new(ScriptedReasoner::answer("draft")),
            Arc::new(ScriptedCritic::new(vec![revise(0.1)])),
            Arc::new(ScriptedRefiner::new()),
        );
        let two = GraphConfig::new(2);
        let four = GraphConfig::new(4);

        let (a, b) = tokio::join!(graph.run("first", &two), graph.run("second", &four));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(a.query(), "first");
        assert_eq!(a.rounds().len(), 2);
        assert_eq!(b.rounds().len(), 4);
        assert_contiguous(&a);
        assert_contiguous(&b);
    }
}
