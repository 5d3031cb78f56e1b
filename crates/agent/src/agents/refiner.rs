//! LLM-backed refiner: rewrites a candidate to address its critique.

use std::sync::Arc;

use async_trait::async_trait;
use cogloop_core::error::AgentError;
use cogloop_core::message::Message;
use cogloop_core::provider::Provider;
use cogloop_core::state::{Critique, ReasoningState};
use tracing::debug;

use super::{AgentRole, AgentSettings, RefinerAgent, complete_text, render_history};

const SYSTEM_PROMPT: &str = "You revise answers. Rewrite the candidate so that every point \
raised by the reviewer is addressed. Reply with the full revised answer only.";

pub struct LlmRefiner {
    provider: Arc<dyn Provider>,
    settings: AgentSettings,
}

impl LlmRefiner {
    pub fn new(provider: Arc<dyn Provider>, settings: AgentSettings) -> Self {
        Self { provider, settings }
    }

    fn build_messages(
        &self,
        state: &ReasoningState,
        candidate: &str,
        critique: &Critique,
    ) -> Vec<Message> {
        let mut feedback = String::new();
        for reason in &critique.reasons {
            feedback.push_str(&format!("- {reason}\n"));
        }
        if feedback.is_empty() {
            feedback.push_str("- (no specific reasons given; improve correctness and clarity)\n");
        }

        let prompt = format!(
            "Question:\n{}\n\nPrevious rounds:\n{}Candidate to revise:\n{}\n\nReviewer feedback:\n{}",
            state.query(),
            render_history(state),
            candidate,
            feedback
        );
        vec![self.settings.system_message(SYSTEM_PROMPT), Message::user(prompt)]
    }
}

#[async_trait]
impl RefinerAgent for LlmRefiner {
    async fn refine(
        &self,
        state: &ReasoningState,
        candidate: &str,
        critique: &Critique,
    ) -> Result<String, AgentError> {
        debug!(
            session_id = %state.session_id(),
            reasons = critique.reasons.len(),
            "Refiner: revising candidate"
        );
        complete_text(
            self.provider.as_ref(),
            &self.settings,
            self.build_messages(state, candidate, critique),
        )
        .await
        .map_err(|e| AgentRole::Refiner.failure(e.to_string()))
    }
}
