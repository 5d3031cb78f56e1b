//! Per-run configuration for the reasoning graph.

use std::time::Duration;

use thiserror::Error;

/// Bounded exponential backoff applied to failed agent calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = fail on first error).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Budget and failure policy for one `run`.
///
/// No `Default`: callers always choose the round budget.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphConfig {
    /// Maximum rounds per session (> 0).
    pub max_rounds: u32,
    /// Stop after this many rounds without a confidence improvement.
    pub stagnation_window: Option<u32>,
    /// Timeout for each individual agent call.
    pub per_call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl GraphConfig {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            max_rounds,
            stagnation_window: None,
            per_call_timeout: Duration::from_secs(120),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_stagnation_window(mut self, window: u32) -> Self {
        self.stagnation_window = Some(window);
        self
    }

    pub fn with_per_call_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build from the `[reasoning]` section of the app config.
    pub fn from_settings(settings: &cogloop_config::ReasoningConfig) -> Self {
        let retry = &settings.retry;
        Self {
            max_rounds: settings.max_rounds,
            stagnation_window: settings.stagnation_window,
            per_call_timeout: Duration::from_secs(settings.per_call_timeout_secs),
            retry: RetryPolicy {
                max_retries: retry.max_retries,
                initial_backoff: Duration::from_millis(retry.backoff_ms),
                multiplier: retry.backoff_multiplier,
                max_backoff: Duration::from_millis(retry.max_backoff_ms),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_rounds == 0 {
            return Err(ConfigurationError::ZeroMaxRounds);
        }
        if self.stagnation_window == Some(0) {
            return Err(ConfigurationError::ZeroStagnationWindow);
        }
        if self.per_call_timeout.is_zero() {
            return Err(ConfigurationError::ZeroTimeout);
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(ConfigurationError::ShrinkingBackoff(self.retry.multiplier));
        }
        Ok(())
    }
}

/// Invalid graph configuration, reported before any agent runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("max_rounds must be greater than zero")]
    ZeroMaxRounds,

    #[error("stagnation_window must be greater than zero (use None to disable)")]
    ZeroStagnationWindow,

    #[error("per_call_timeout must be greater than zero")]
    ZeroTimeout,

    #[error("retry backoff multiplier must be >= 1.0, got {0}")]
    ShrinkingBackoff(f64),
}
