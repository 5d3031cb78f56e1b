//! The cogloop reasoning loop.
//!
//! A session follows a **Reason → Critique → Refine** cycle:
//!
//! 1. **Reason**: the reasoner drafts a first candidate answer
//! 2. **Critique**: the critic returns a verdict, reasons, and a confidence
//! 3. **Decide**: accept, budget, and stagnation rules are checked in order
//! 4. **Refine**: on `revise`, the refiner rewrites the candidate and the
//!    loop returns to step 2
//!
//! [`ReasoningGraph`] owns the loop; the agents are traits so the same loop
//! runs against LLM-backed agents ([`LlmReasoner`], [`LlmCritic`],
//! [`LlmRefiner`]) or test doubles.

pub mod agents;
pub mod graph;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agents::{
    AgentRole, AgentSettings, CriticAgent, LlmCritic, LlmReasoner, LlmRefiner, ReasonerAgent,
    RefinerAgent, parse_critique,
};
pub use graph::{
    ConfigurationError, Decision, FailureCause, GraphConfig, ReasoningGraph, RetryPolicy,
    SessionFailure,
};
