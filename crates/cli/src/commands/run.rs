//! `cogloop run`: Run one reasoning session and print the transcript.

use std::sync::Arc;
use std::time::Duration;

use cogloop_agent::{
    AgentRole, AgentSettings, GraphConfig, LlmCritic, LlmReasoner, LlmRefiner, ReasoningGraph,
};
use cogloop_config::AppConfig;
use cogloop_core::event::{DomainEvent, EventBus};
use cogloop_core::provider::Provider;
use cogloop_core::state::ReasoningState;
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tokio_util::sync::CancellationToken;

/// Providers that run locally and need no API key.
const KEYLESS_PROVIDERS: &[&str] = &["ollama", "vllm", "llamacpp", "llama.cpp"];

/// Command-line overrides for the `[reasoning]` section.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub max_rounds: Option<u32>,
    pub stagnation_window: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub json: bool,
}

pub async fn run(query: String, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && !KEYLESS_PROVIDERS.contains(&config.default_provider.as_str()) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...   (recommended)");
        eprintln!("    OPENAI_API_KEY=sk-...             (for OpenAI direct)");
        eprintln!("    COGLOOP_API_KEY=sk-...            (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = cogloop_providers::build_from_config(&config);
    let provider = router
        .default()
        .ok_or_else(|| format!("Provider '{}' is not configured", config.default_provider))?;

    let graph_config = graph_config(&config, &options);
    let event_bus = Arc::new(EventBus::default());
    let graph = build_graph(provider, &config).with_event_bus(event_bus.clone());

    let progress = (!options.json).then(|| tokio::spawn(report_progress(event_bus.subscribe())));

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if wait_for_interrupts(tokio::signal::ctrl_c, cancel).await {
                eprintln!("\n  Interrupted.");
                std::process::exit(130);
            }
        })
    };

    let outcome = graph.run_with_cancel(query, &graph_config, cancel).await;
    ctrl_c.abort();

    // Closing the bus lets the progress task drain and exit.
    drop(graph);
    drop(event_bus);
    if let Some(progress) = progress {
        let _ = progress.await;
    }

    match outcome {
        Ok(state) => print_state(&state, options.json),
        Err(failure) => {
            print_state(&failure.state, options.json)?;
            Err(failure.into())
        }
    }
}

/// Cancel `cancel` on the first interrupt and return `true` on the second.
///
/// Returns `false` if the signal source fails first.
async fn wait_for_interrupts<F, Fut>(mut next_interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    eprintln!("\n  Cancelling after the current step (Ctrl-C again to quit)...");
    cancel.cancel();

    next_interrupt().await.is_ok()
}

/// Resolve the graph configuration: config file first, then CLI overrides.
pub fn graph_config(config: &AppConfig, options: &RunOptions) -> GraphConfig {
    let mut graph = GraphConfig::from_settings(&config.reasoning);
    if let Some(rounds) = options.max_rounds {
        graph.max_rounds = rounds;
    }
    if let Some(window) = options.stagnation_window {
        graph.stagnation_window = Some(window);
    }
    if let Some(secs) = options.timeout_secs {
        graph.per_call_timeout = Duration::from_secs(secs);
    }
    graph
}

fn build_graph(provider: Arc<dyn Provider>, config: &AppConfig) -> ReasoningGraph {
    ReasoningGraph::new(
        Arc::new(LlmReasoner::new(
            provider.clone(),
            AgentSettings::from_config(config, AgentRole::Reasoner),
        )),
        Arc::new(LlmCritic::new(
            provider.clone(),
            AgentSettings::from_config(config, AgentRole::Critic),
        )),
        Arc::new(LlmRefiner::new(
            provider,
            AgentSettings::from_config(config, AgentRole::Refiner),
        )),
    )
}

async fn report_progress(mut rx: Receiver<Arc<DomainEvent>>) {
    loop {
        match rx.recv().await {
            Ok(event) => match event.as_ref() {
                DomainEvent::RoundStarted { round, .. } => {
                    eprintln!("  ... round {round}: critiquing");
                }
                DomainEvent::CritiqueRecorded {
                    round,
                    verdict,
                    confidence,
                    ..
                } => {
                    eprintln!("  ... round {round}: {verdict} (confidence {confidence:.2})");
                }
                DomainEvent::AgentRetried {
                    agent,
                    attempt,
                    error_message,
                    ..
                } => {
                    eprintln!("  ... retrying {agent} (attempt {attempt}): {error_message}");
                }
                _ => {}
            },
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_state(state: &ReasoningState, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
    } else {
        print!("{}", render_transcript(state));
    }
    Ok(())
}

/// Human-readable transcript of a finished session.
pub fn render_transcript(state: &ReasoningState) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n  Query: {}\n", state.query()));

    for round in state.rounds() {
        match &round.critique {
            Some(critique) => out.push_str(&format!(
                "\n  ── Round {} [{}, confidence {:.2}]\n",
                round.index, critique.verdict, critique.confidence
            )),
            None => out.push_str(&format!("\n  ── Round {} [not critiqued]\n", round.index)),
        }
        for line in round.candidate.lines() {
            out.push_str(&format!("  {line}\n"));
        }
        if let Some(critique) = &round.critique {
            for reason in &critique.reasons {
                out.push_str(&format!("    - {reason}\n"));
            }
        }
    }

    let reason = state
        .termination()
        .map(|r| r.to_string())
        .unwrap_or_else(|| "running".into());
    out.push_str(&format!(
        "\n  Result: {reason} after {} round(s)\n",
        state.rounds().len()
    ));
    if let Some(answer) = state.final_answer() {
        out.push_str(&format!("\n{answer}\n"));
    }
    out
}
