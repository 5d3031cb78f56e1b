//! Session-level failure surfaced to the caller of `ReasoningGraph::run`.

use cogloop_core::error::{AgentError, StateError};
use cogloop_core::state::{ErrorKind, ReasoningState};
use thiserror::Error;

use super::config::ConfigurationError;

/// Root cause of a failed session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureCause {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("session cancelled")]
    Cancelled,

    /// The loop attempted an illegal transcript transition.
    #[error("invalid state transition: {0}")]
    State(#[from] StateError),
}

impl FailureCause {
    /// The termination kind recorded on the state for this cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Agent(AgentError::Generation(_)) | Self::State(_) => ErrorKind::Generation,
            Self::Agent(AgentError::Evaluation(_)) => ErrorKind::Evaluation,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// A session that ended with [`TerminationReason::Error`](cogloop_core::TerminationReason).
///
/// Carries the partial state (already terminated, every completed round
/// preserved) alongside the root cause.
#[derive(Debug, Error)]
#[error("reasoning session {} failed after {} round(s): {cause}", .state.session_id(), .state.rounds().len())]
pub struct SessionFailure {
    pub cause: FailureCause,
    pub state: Box<ReasoningState>,
}

impl SessionFailure {
    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause == FailureCause::Cancelled
    }

    /// The originating agent failure, if an agent caused this.
    pub fn agent_error(&self) -> Option<&AgentError> {
        match &self.cause {
            FailureCause::Agent(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_state(self) -> ReasoningState {
        *self.state
    }
}
