//! LLM-backed critic: judges a candidate and returns a structured critique.
//!
//! The model is asked for a single JSON object:
//!
//! ```json
//! {"verdict": "accept" | "revise", "reasons": ["..."], "confidence": 0.0-1.0}
//! ```
//!
//! Models wrap JSON in code fences or prose often enough that the parser
//! looks for the object instead of demanding a bare body.

use std::sync::Arc;

use async_trait::async_trait;
use cogloop_core::error::AgentError;
use cogloop_core::message::Message;
use cogloop_core::provider::Provider;
use cogloop_core::state::{Critique, ReasoningState, Verdict};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{AgentRole, AgentSettings, CriticAgent, complete_text, render_history};

const SYSTEM_PROMPT: &str = "You are a strict reviewer. Decide whether the candidate answer \
fully and correctly answers the question. Reply with only a JSON object of the form \
{\"verdict\": \"accept\" or \"revise\", \"reasons\": [short strings], \"confidence\": number between 0 and 1}.";

pub struct LlmCritic {
    provider: Arc<dyn Provider>,
    settings: AgentSettings,
}

impl LlmCritic {
    pub fn new(provider: Arc<dyn Provider>, settings: AgentSettings) -> Self {
        Self { provider, settings }
    }

    fn build_messages(&self, state: &ReasoningState, candidate: &str) -> Vec<Message> {
        let mut prompt = format!("Question:\n{}\n\n", state.query());
        if state.completed_rounds().next().is_some() {
            prompt.push_str("Review history:\n");
            prompt.push_str(&render_history(state));
        }
        prompt.push_str(&format!("Candidate answer:\n{candidate}"));
        vec![self.settings.system_message(SYSTEM_PROMPT), Message::user(prompt)]
    }
}

#[async_trait]
impl CriticAgent for LlmCritic {
    async fn critique(
        &self,
        state: &ReasoningState,
        candidate: &str,
    ) -> Result<Critique, AgentError> {
        debug!(
            session_id = %state.session_id(),
            round = state.rounds().len().saturating_sub(1),
            "Critic: evaluating candidate"
        );
        let text = complete_text(
            self.provider.as_ref(),
            &self.settings,
            self.build_messages(state, candidate),
        )
        .await
        .map_err(|e| AgentRole::Critic.failure(e.to_string()))?;

        parse_critique(&text).inspect_err(|e| warn!(error = %e, "Critic: unparseable verdict"))
    }
}

#[derive(Debug, Deserialize)]
struct RawCritique {
    verdict: String,
    #[serde(default)]
    reasons: Vec<String>,
    confidence: f32,
}

/// Parse a critic completion into a [`Critique`].
///
/// Accepts a bare JSON object, one inside a fenced code block, or one
/// embedded in surrounding prose. Confidence is clamped into `[0, 1]`.
pub fn parse_critique(text: &str) -> Result<Critique, AgentError> {
    let raw = find_critique_object(text)?;

    let verdict = match raw.verdict.trim().to_ascii_lowercase().as_str() {
        "accept" | "accepted" | "approve" | "approved" => Verdict::Accept,
        "revise" | "revision" | "reject" | "rejected" => Verdict::Revise,
        other => {
            return Err(AgentError::Evaluation(format!(
                "unknown verdict '{other}'"
            )));
        }
    };

    let reasons = raw
        .reasons
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    Ok(Critique::new(verdict, reasons, raw.confidence))
}

/// Deserialize the first balanced JSON object in `text` that has the
/// critique shape.
///
/// Each `{` is tried as the start of an object, so stray braces in prose
/// before or after the verdict are skipped.
fn find_critique_object(text: &str) -> Result<RawCritique, AgentError> {
    let body = fenced_body(text.trim());

    let mut error: Option<serde_json::Error> = None;
    for (start, _) in body.match_indices('{') {
        let mut objects =
            serde_json::Deserializer::from_str(&body[start..]).into_iter::<RawCritique>();
        match objects.next() {
            Some(Ok(raw)) => return Ok(raw),
            // A well-formed object of the wrong shape says more than a syntax error.
            Some(Err(e)) if !error.as_ref().is_some_and(|prev| prev.is_data()) => error = Some(e),
            _ => {}
        }
    }

    Err(match error {
        Some(e) => AgentError::Evaluation(format!("malformed critique: {e}")),
        None => AgentError::Evaluation("critic reply contains no JSON object".into()),
    })
}

/// The contents of the first fenced code block, or all of `text`.
fn fenced_body(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    match after.find("```") {
        Some(close) => &after[..close],
        None => after,
    }
}
