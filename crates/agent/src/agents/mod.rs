//! Agent roles: the three steps of a reasoning round.
//!
//! Each role is a trait so the graph can run against LLM-backed agents in
//! production and deterministic doubles in tests. Agents get a shared borrow
//! of the session state and hand back new data; they never mutate the state
//! and carry no mutable context between calls.

pub mod critic;
pub mod reasoner;
pub mod refiner;

use std::time::Duration;

use async_trait::async_trait;
use cogloop_core::error::{AgentError, ProviderError};
use cogloop_core::message::Message;
use cogloop_core::provider::{Provider, ProviderRequest};
use cogloop_core::state::{Critique, ReasoningState};

pub use critic::{LlmCritic, parse_critique};
pub use reasoner::LlmReasoner;
pub use refiner::LlmRefiner;

/// Produces the first candidate answer for a session.
#[async_trait]
pub trait ReasonerAgent: Send + Sync {
    fn name(&self) -> &str {
        "reasoner"
    }

    async fn reason(&self, state: &ReasoningState) -> Result<String, AgentError>;
}

/// Judges the latest candidate.
#[async_trait]
pub trait CriticAgent: Send + Sync {
    fn name(&self) -> &str {
        "critic"
    }

    async fn critique(
        &self,
        state: &ReasoningState,
        candidate: &str,
    ) -> Result<Critique, AgentError>;
}

/// Produces a revised candidate from a `revise` critique.
#[async_trait]
pub trait RefinerAgent: Send + Sync {
    fn name(&self) -> &str {
        "refiner"
    }

    async fn refine(
        &self,
        state: &ReasoningState,
        candidate: &str,
        critique: &Critique,
    ) -> Result<String, AgentError>;
}

/// Which step of the loop an agent call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Reasoner,
    Critic,
    Refiner,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reasoner => "reasoner",
            Self::Critic => "critic",
            Self::Refiner => "refiner",
        }
    }

    /// Wrap `reason` in the failure kind this role raises.
    pub fn failure(&self, reason: impl Into<String>) -> AgentError {
        match self {
            Self::Reasoner | Self::Refiner => AgentError::Generation(reason.into()),
            Self::Critic => AgentError::Evaluation(reason.into()),
        }
    }

    pub fn timeout(&self, limit: Duration) -> AgentError {
        self.failure(format!(
            "{} call timed out after {}ms",
            self.as_str(),
            limit.as_millis()
        ))
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model settings shared by the LLM-backed agents.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Replaces the role's built-in system prompt.
    pub system_prompt: Option<String>,
}

impl AgentSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            system_prompt: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Resolve one role's settings from the app config, applying the
    /// `[agents.<role>]` overrides on top of the top-level defaults.
    ///
    /// The model comes from the role override, then the default provider's
    /// `default_model`, then the top-level `default_model`.
    pub fn from_config(config: &cogloop_config::AppConfig, role: AgentRole) -> Self {
        let overrides = match role {
            AgentRole::Reasoner => &config.agents.reasoner,
            AgentRole::Critic => &config.agents.critic,
            AgentRole::Refiner => &config.agents.refiner,
        };
        let provider_model = config
            .providers
            .get(&config.default_provider)
            .and_then(|provider| provider.default_model.clone());
        Self {
            model: overrides
                .model
                .clone()
                .or(provider_model)
                .unwrap_or_else(|| config.default_model.clone()),
            temperature: overrides.temperature.unwrap_or(config.default_temperature),
            max_tokens: Some(config.default_max_tokens),
            system_prompt: None,
        }
    }

    fn system_message(&self, default_prompt: &str) -> Message {
        Message::system(self.system_prompt.as_deref().unwrap_or(default_prompt))
    }
}

/// Send `messages` and return the non-empty completion text.
async fn complete_text(
    provider: &dyn Provider,
    settings: &AgentSettings,
    messages: Vec<Message>,
) -> Result<String, ProviderError> {
    let request = ProviderRequest {
        model: settings.model.clone(),
        messages,
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        stop: vec![],
    };

    let response = provider.complete(request).await?;
    let text = response.content.trim();
    if text.is_empty() {
        return Err(ProviderError::ApiError {
            status_code: 200,
            message: "empty completion".into(),
        });
    }
    Ok(text.to_string())
}

/// Render the critiqued rounds as plain text for a prompt.
///
/// The open round, if any, is left out: callers show it on its own.
fn render_history(state: &ReasoningState) -> String {
    let mut out = String::new();
    for round in state.completed_rounds() {
        out.push_str(&format!("### Round {}\n{}\n", round.index, round.candidate));
        if let Some(critique) = &round.critique {
            out.push_str(&format!(
                "Critique: {} (confidence {:.2})\n",
                critique.verdict, critique.confidence
            ));
            for reason in &critique.reasons {
                out.push_str(&format!("- {reason}\n"));
            }
        }
        out.push('\n');
    }
    out
}
