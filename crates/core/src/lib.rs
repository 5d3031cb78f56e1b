//! # cogloop Core
//!
//! Domain types, traits, and error definitions for the cogloop multi-round
//! reasoning loop. This crate has **no framework dependencies**; it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The generation service is a trait here; implementations live in
//! `cogloop-providers`. The session record ([`ReasoningState`]) enforces its
//! own invariants so the loop cannot produce a malformed transcript.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod state;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, ProviderError, StateError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use state::{
    Critique, ErrorKind, ReasoningState, Round, SessionId, TerminationReason, Verdict,
};
