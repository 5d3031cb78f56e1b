//! Termination policy evaluated after every critique.
//!
//! Checks run in a fixed order: acceptance, then the round budget, then
//! stagnation. An accepted final round therefore reports `Accepted` even
//! when it also exhausts the budget.

use cogloop_core::state::{Critique, TerminationReason};

use super::config::GraphConfig;

/// What the graph does after a round has been critiqued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Terminate(TerminationReason),
    Refine,
}

/// Decide the next transition for round `round_index`.
///
/// `confidences` holds every critiqued round's confidence, including the
/// one for `critique`.
pub fn decide(
    config: &GraphConfig,
    round_index: usize,
    critique: &Critique,
    confidences: &[f32],
) -> Decision {
    if critique.is_accept() {
        return Decision::Terminate(TerminationReason::Accepted);
    }

    if round_index + 1 >= config.max_rounds as usize {
        return Decision::Terminate(TerminationReason::MaxRounds);
    }

    if let Some(window) = config.stagnation_window
        && stagnated(confidences, window as usize)
    {
        return Decision::Terminate(TerminationReason::NoImprovement);
    }

    Decision::Refine
}

/// True when none of the last `window` confidences is strictly higher than
/// the one before it.
///
/// Fires as soon as `window` rounds are critiqued. A window of one compares
/// the latest confidence with its predecessor; a zero window never fires.
pub fn stagnated(confidences: &[f32], window: usize) -> bool {
    let span = window.max(2);
    if window == 0 || confidences.len() < span {
        return false;
    }

    let recent = &confidences[confidences.len() - span..];
    recent.windows(2).all(|pair| pair[1] <= pair[0])
}
