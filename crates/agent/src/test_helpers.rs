//! Shared test helpers: a scripted provider and deterministic agent doubles.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cogloop_core::error::{AgentError, ProviderError};
use cogloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use cogloop_core::state::{Critique, ReasoningState};
use tokio_util::sync::CancellationToken;

use crate::agents::{CriticAgent, ReasonerAgent, RefinerAgent};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Vec<Result<ProviderResponse, ProviderError>>,
    call_count: AtomicUsize,
    last_request: Mutex<Option<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses,
            call_count: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(make_text_response(t))).collect())
    }

    /// A provider whose only call fails with a network error.
    pub fn failing() -> Self {
        Self::new(vec![Err(ProviderError::Network("connection refused".into()))])
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);

        match self.responses.get(call) {
            Some(response) => response.clone(),
            None => panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                call,
                self.responses.len()
            ),
        }
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.to_string(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Reasoner that answers with fixed text, optionally after some failures.
pub struct ScriptedReasoner {
    answer: Option<String>,
    error: String,
    failures_before_success: usize,
    calls: AtomicUsize,
}

impl ScriptedReasoner {
    pub fn answer(text: &str) -> Self {
        Self::flaky(0, text)
    }

    pub fn failing(error: &str) -> Self {
        Self {
            answer: None,
            error: error.to_string(),
            failures_before_success: usize::MAX,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail `failures` times, then answer with `text`.
    pub fn flaky(failures: usize, text: &str) -> Self {
        Self {
            answer: Some(text.to_string()),
            error: "transient upstream error".into(),
            failures_before_success: failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasonerAgent for ScriptedReasoner {
    async fn reason(&self, _state: &ReasoningState) -> Result<String, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Some(answer) if call >= self.failures_before_success => Ok(answer.clone()),
            _ => Err(AgentError::Generation(self.error.clone())),
        }
    }
}

/// Critic that replays a fixed list of critiques, repeating the last one.
pub struct ScriptedCritic {
    script: Vec<Critique>,
    error: Option<String>,
    cancel_on: Option<(CancellationToken, usize)>,
    calls: AtomicUsize,
}

impl ScriptedCritic {
    pub fn new(script: Vec<Critique>) -> Self {
        Self {
            script,
            error: None,
            cancel_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(vec![])
        }
    }

    /// Fire `token` while handling call number `call` (0-based).
    pub fn cancelling(mut self, token: CancellationToken, call: usize) -> Self {
        self.cancel_on = Some((token, call));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CriticAgent for ScriptedCritic {
    async fn critique(
        &self,
        _state: &ReasoningState,
        _candidate: &str,
    ) -> Result<Critique, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((token, at)) = &self.cancel_on {
            if *at == call {
                token.cancel();
            }
        }
        if let Some(error) = &self.error {
            return Err(AgentError::Evaluation(error.clone()));
        }

        self.script
            .get(call)
            .or_else(|| self.script.last())
            .cloned()
            .ok_or_else(|| AgentError::Evaluation("empty critic script".into()))
    }
}

/// Refiner that answers "revision N" on its Nth call.
#[derive(Default)]
pub struct ScriptedRefiner {
    calls: AtomicUsize,
}

impl ScriptedRefiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefinerAgent for ScriptedRefiner {
    async fn refine(
        &self,
        _state: &ReasoningState,
        _candidate: &str,
        _critique: &Critique,
    ) -> Result<String, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("revision {call}"))
    }
}

/// Critic that never answers within any sane timeout.
pub struct HangingCritic;

#[async_trait]
impl CriticAgent for HangingCritic {
    async fn critique(
        &self,
        _state: &ReasoningState,
        _candidate: &str,
    ) -> Result<Critique, AgentError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Critique::accept(1.0))
    }
}
