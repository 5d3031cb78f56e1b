//! LLM-backed reasoner: drafts the first candidate answer.

use std::sync::Arc;

use async_trait::async_trait;
use cogloop_core::error::AgentError;
use cogloop_core::message::Message;
use cogloop_core::provider::Provider;
use cogloop_core::state::ReasoningState;
use tracing::debug;

use super::{AgentRole, AgentSettings, ReasonerAgent, complete_text, render_history};

const SYSTEM_PROMPT: &str = "You are a careful reasoner. Think the problem through step by step \
and reply with a complete, self-contained answer to the question.";

pub struct LlmReasoner {
    provider: Arc<dyn Provider>,
    settings: AgentSettings,
}

impl LlmReasoner {
    pub fn new(provider: Arc<dyn Provider>, settings: AgentSettings) -> Self {
        Self { provider, settings }
    }

    fn build_messages(&self, state: &ReasoningState) -> Vec<Message> {
        let mut prompt = format!("Question:\n{}", state.query());
        if !state.rounds().is_empty() {
            prompt.push_str("\n\nEarlier attempts:\n");
            prompt.push_str(&render_history(state));
        }
        vec![self.settings.system_message(SYSTEM_PROMPT), Message::user(prompt)]
    }
}

#[async_trait]
impl ReasonerAgent for LlmReasoner {
    async fn reason(&self, state: &ReasoningState) -> Result<String, AgentError> {
        debug!(session_id = %state.session_id(), model = %self.settings.model, "Reasoner: drafting");
        complete_text(self.provider.as_ref(), &self.settings, self.build_messages(state))
            .await
            .map_err(|e| AgentRole::Reasoner.failure(e.to_string()))
    }
}
