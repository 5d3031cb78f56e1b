//! Error types for the cogloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

// --- Generation service errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

// --- Agent errors ---

/// Failure raised by one of the reasoning agents.
///
/// Reasoner and refiner failures are `Generation`; critic failures are
/// `Evaluation`. Timeouts and malformed model output land in the same
/// variants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),
}

impl AgentError {
    pub fn is_generation(&self) -> bool {
        matches!(self, Self::Generation(_))
    }

    pub fn is_evaluation(&self) -> bool {
        matches!(self, Self::Evaluation(_))
    }
}

// --- State errors ---

/// Violations of the [`ReasoningState`](crate::state::ReasoningState) invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Session already terminated; no further changes allowed")]
    Terminated,

    #[error("Round {0} is still awaiting its critique")]
    RoundOpen(usize),

    #[error("No open round to attach a critique to")]
    NoOpenRound,
}
