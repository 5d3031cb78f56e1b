//! Reasoning session state: the append-only record of one session.
//!
//! A [`ReasoningState`] is created by the graph at loop start, grows one
//! [`Round`] at a time, and freezes once a [`TerminationReason`] is set.
//! Agents only ever see it through a shared borrow.
//!
//! Invariants enforced here:
//! - round indices are `0..n`, contiguous and strictly increasing
//! - at most one round is open (no critique yet), and it is always the last
//! - nothing changes after termination

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StateError;

/// Unique identifier for a reasoning session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The critic's decision for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accept,
    Revise,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Revise => write!(f, "revise"),
        }
    }
}

/// Structured evaluation of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub verdict: Verdict,
    /// Ordered reasons backing the verdict.
    #[serde(default)]
    pub reasons: Vec<String>,
    /// Advisory confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Critique {
    /// Build a critique, clamping `confidence` into `[0, 1]` (NaN becomes 0).
    pub fn new(verdict: Verdict, reasons: Vec<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            verdict,
            reasons,
            confidence,
        }
    }

    pub fn accept(confidence: f32) -> Self {
        Self::new(Verdict::Accept, Vec::new(), confidence)
    }

    pub fn revise(reasons: Vec<String>, confidence: f32) -> Self {
        Self::new(Verdict::Revise, reasons, confidence)
    }

    pub fn is_accept(&self) -> bool {
        self.verdict == Verdict::Accept
    }
}

/// One reasoner/refiner → critic cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub index: usize,
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critique: Option<Critique>,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
}

impl Round {
    /// A round is open until the critic has judged its candidate.
    pub fn is_open(&self) -> bool {
        self.critique.is_none()
    }
}

/// Which failure ended a session with [`TerminationReason::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Generation,
    Evaluation,
    Configuration,
    Cancelled,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    Accepted,
    MaxRounds,
    NoImprovement,
    Error { kind: ErrorKind },
}

impl TerminationReason {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::MaxRounds => write!(f, "max_rounds"),
            Self::NoImprovement => write!(f, "no_improvement"),
            Self::Error { kind } => {
                let kind = match kind {
                    ErrorKind::Generation => "generation",
                    ErrorKind::Evaluation => "evaluation",
                    ErrorKind::Configuration => "configuration",
                    ErrorKind::Cancelled => "cancelled",
                };
                write!(f, "error/{kind}")
            }
        }
    }
}

/// The evolving record of one reasoning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningState {
    session_id: SessionId,
    query: String,
    rounds: Vec<Round>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    termination: Option<TerminationReason>,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl ReasoningState {
    /// Start an empty session for `query`.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            session_id: SessionId::new(),
            query: query.into(),
            rounds: Vec::new(),
            termination: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn last_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    /// The round still awaiting a critique, if any.
    pub fn open_round(&self) -> Option<&Round> {
        self.rounds.last().filter(|r| r.is_open())
    }

    /// Rounds that carry a critique.
    pub fn completed_rounds(&self) -> impl Iterator<Item = &Round> {
        self.rounds.iter().filter(|r| !r.is_open())
    }

    /// Index the next appended round would take.
    pub fn current_round(&self) -> usize {
        self.rounds.len()
    }

    /// Critic confidences in round order.
    pub fn confidences(&self) -> Vec<f32> {
        self.completed_rounds()
            .filter_map(|r| r.critique.as_ref().map(|c| c.confidence))
            .collect()
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    pub fn is_terminal(&self) -> bool {
        self.termination.is_some()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// The accepted candidate, else the most recent one.
    pub fn final_answer(&self) -> Option<&str> {
        self.rounds
            .iter()
            .rev()
            .find(|r| r.accepted)
            .or_else(|| self.rounds.last())
            .map(|r| r.candidate.as_str())
    }

    /// Append a new open round and return its index.
    pub fn begin_round(&mut self, candidate: impl Into<String>) -> Result<usize, StateError> {
        self.ensure_live()?;
        if let Some(open) = self.open_round() {
            return Err(StateError::RoundOpen(open.index));
        }

        let index = self.rounds.len();
        self.rounds.push(Round {
            index,
            candidate: candidate.into(),
            critique: None,
            accepted: false,
            created_at: Utc::now(),
        });
        Ok(index)
    }

    /// Close the open round with the critic's judgement.
    pub fn record_critique(&mut self, critique: Critique) -> Result<(), StateError> {
        self.ensure_live()?;
        let round = self
            .rounds
            .last_mut()
            .filter(|r| r.is_open())
            .ok_or(StateError::NoOpenRound)?;

        round.accepted = critique.is_accept();
        round.critique = Some(critique);
        Ok(())
    }

    /// Freeze the session with `reason`.
    pub fn terminate(&mut self, reason: TerminationReason) -> Result<(), StateError> {
        self.ensure_live()?;
        self.termination = Some(reason);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), StateError> {
        if self.is_terminal() {
            Err(StateError::Terminated)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_empty_and_live() {
        let state = ReasoningState::new("why is the sky blue?");
        assert_eq!(state.query(), "why is the sky blue?");
        assert!(state.rounds().is_empty());
        assert_eq!(state.current_round(), 0);
        assert!(!state.is_terminal());
        assert!(state.final_answer().is_none());
    }

    #[test]
    fn rounds_are_contiguous() {
        let mut state = ReasoningState::new("q");
        for expected in 0..3 {
            let idx = state.begin_round(format!("candidate {expected}")).unwrap();
            assert_eq!(idx, expected);
            state
                .record_critique(Critique::revise(vec!["more detail".into()], 0.4))
                .unwrap();
        }
        let indices: Vec<usize> = state.rounds().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn only_one_open_round() {
        let mut state = ReasoningState::new("q");
        state.begin_round("first").unwrap();
        assert_eq!(state.begin_round("second"), Err(StateError::RoundOpen(0)));
        assert_eq!(state.open_round().unwrap().candidate, "first");
    }

    #[test]
    fn critique_requires_open_round() {
        let mut state = ReasoningState::new("q");
        assert_eq!(
            state.record_critique(Critique::accept(1.0)),
            Err(StateError::NoOpenRound)
        );

        state.begin_round("a").unwrap();
        state.record_critique(Critique::accept(1.0)).unwrap();
        // Closed rounds cannot be critiqued twice.
        assert_eq!(
            state.record_critique(Critique::accept(1.0)),
            Err(StateError::NoOpenRound)
        );
    }

    #[test]
    fn accept_marks_round_accepted() {
        let mut state = ReasoningState::new("q");
        state.begin_round("draft").unwrap();
        state
            .record_critique(Critique::revise(vec!["vague".into()], 0.3))
            .unwrap();
        state.begin_round("better").unwrap();
        state.record_critique(Critique::accept(0.9)).unwrap();

        assert!(!state.rounds()[0].accepted);
        assert!(state.rounds()[1].accepted);
        assert_eq!(state.final_answer(), Some("better"));
        assert_eq!(state.confidences(), vec![0.3, 0.9]);
    }

    #[test]
    fn terminated_state_is_frozen() {
        let mut state = ReasoningState::new("q");
        state.begin_round("a").unwrap();
        state.record_critique(Critique::accept(0.8)).unwrap();
        state.terminate(TerminationReason::Accepted).unwrap();

        assert!(state.finished_at().is_some());
        assert_eq!(state.begin_round("b"), Err(StateError::Terminated));
        assert_eq!(
            state.terminate(TerminationReason::MaxRounds),
            Err(StateError::Terminated)
        );
        assert_eq!(state.termination(), Some(TerminationReason::Accepted));
    }

    #[test]
    fn open_round_survives_error_termination() {
        let mut state = ReasoningState::new("q");
        state.begin_round("pending").unwrap();
        state
            .terminate(TerminationReason::Error {
                kind: ErrorKind::Evaluation,
            })
            .unwrap();

        assert_eq!(state.rounds().len(), 1);
        assert_eq!(state.completed_rounds().count(), 0);
        assert_eq!(state.final_answer(), Some("pending"));
    }

    #[test]
    fn critique_confidence_is_clamped() {
        assert_eq!(Critique::accept(1.7).confidence, 1.0);
        assert_eq!(Critique::revise(vec![], -0.2).confidence, 0.0);
        assert_eq!(Critique::revise(vec![], f32::NAN).confidence, 0.0);
    }

    #[test]
    fn termination_reason_display_and_serde() {
        let reason = TerminationReason::Error {
            kind: ErrorKind::Cancelled,
        };
        assert_eq!(reason.to_string(), "error/cancelled");
        assert!(reason.is_error());

        let json = serde_json::to_string(&reason).unwrap();
        assert_eq!(json, r#"{"reason":"error","kind":"cancelled"}"#);
        assert_eq!(
            serde_json::to_string(&TerminationReason::MaxRounds).unwrap(),
            r#"{"reason":"max_rounds"}"#
        );
    }

    #[test]
    fn state_serializes_transcript() {
        let mut state = ReasoningState::new("q");
        state.begin_round("answer").unwrap();
        state
            .record_critique(Critique::new(Verdict::Accept, vec!["correct".into()], 0.95))
            .unwrap();
        state.terminate(TerminationReason::Accepted).unwrap();

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""verdict":"accept""#));

        let restored: ReasoningState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.session_id(), state.session_id());
        assert_eq!(restored.rounds(), state.rounds());
    }
}
