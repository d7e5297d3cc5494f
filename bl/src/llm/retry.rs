//! Retry/backoff state machine for generation calls
//!
//! [`RetryPolicy::decide`] is a pure function of the attempt number, the
//! failure, and a [`JitterSource`]. Diagnostics are emitted separately through a
//! [`RetryObserver`] so the decision logic can be tested without any IO.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::LlmError;

/// HTTP 400 bodies containing any of these (case-insensitive) are transient
/// provider hiccups rather than caller mistakes.
pub const RETRYABLE_400_MARKERS: &[&str] = &[
    "developer instruction is not enabled",
    "provider returned error",
    "no providers available",
    "temporarily unavailable",
    "upstream error",
    "try again",
];

/// Cap on error detail captured from response bodies
pub const MAX_DETAIL_CHARS: usize = 2000;

/// Upper bound on the jitter added to one backoff
const MAX_JITTER: Duration = Duration::from_secs(1);

/// Check if an HTTP status (with its body) is worth retrying
pub fn is_retryable_status(status: u16, detail: &str) -> bool {
    if matches!(status, 408 | 409 | 425 | 429) || status >= 500 {
        return true;
    }
    if status != 400 {
        return false;
    }
    let lowered = detail.to_lowercase();
    RETRYABLE_400_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Why a single attempt did not produce a usable response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The request never got an HTTP response (connect, TLS, timeout)
    Transport(String),
    /// The endpoint answered with a status >= 400
    Status { status: u16, detail: String },
    /// 2xx response whose body is not a JSON object
    MalformedBody(String),
}

impl AttemptFailure {
    /// Build a status failure, capping the captured body
    pub fn status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            detail: truncate_chars(body, MAX_DETAIL_CHARS),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::MalformedBody(_) => true,
            Self::Status { status, detail } => is_retryable_status(*status, detail),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Transport(_) => "transport".to_string(),
            Self::Status { status, .. } => status.to_string(),
            Self::MalformedBody(_) => "invalid_body".to_string(),
        }
    }

    fn detail(&self) -> &str {
        match self {
            Self::Transport(detail) | Self::MalformedBody(detail) => detail,
            Self::Status { detail, .. } => detail,
        }
    }
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.label(), self.detail())
    }
}

/// Source of uniform samples in `[0, 1)` for backoff jitter
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Jitter from the thread-local RNG
#[derive(Debug, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Reproducible jitter from a seeded RNG
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        debug!(seed, "SeededJitter::new: called");
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.random::<f64>(),
            Err(poisoned) => poisoned.into_inner().random::<f64>(),
        }
    }
}

/// Constant jitter (tests, or `0.0` to disable jitter entirely)
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0.clamp(0.0, 1.0)
    }
}

/// What to do after a failed attempt
#[derive(Debug)]
pub enum RetryDecision {
    /// Sleep for `delay`, then issue the next attempt
    Retry { delay: Duration },
    /// Stop and surface the error
    GiveUp(LlmError),
}

/// Retry budget and exponential backoff parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 8,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        debug!(max_retries, ?initial_backoff, ?max_backoff, "RetryPolicy::new: called");
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// `min(max_backoff, initial_backoff * 2^attempt)` without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.initial_backoff.checked_mul(factor))
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    /// Base delay plus jitter of up to 25% of it (capped at one second)
    pub fn backoff(&self, attempt: u32, jitter: &dyn JitterSource) -> Duration {
        let base = self.base_delay(attempt);
        if base.is_zero() {
            return base;
        }
        let jitter_max = base.mul_f64(0.25).min(MAX_JITTER);
        base + jitter_max.mul_f64(jitter.sample().clamp(0.0, 1.0))
    }

    /// Decide whether failed attempt number `attempt` (0-based) is retried
    pub fn decide(&self, attempt: u32, failure: AttemptFailure, jitter: &dyn JitterSource) -> RetryDecision {
        debug!(attempt, %failure, "RetryPolicy::decide: called");
        let retryable = failure.is_retryable();

        if retryable && attempt < self.max_retries {
            let delay = self.backoff(attempt, jitter);
            debug!(attempt, ?delay, "RetryPolicy::decide: retrying");
            return RetryDecision::Retry { delay };
        }

        let error = match failure {
            AttemptFailure::Status { status, detail } if !retryable => LlmError::Fatal { status, detail },
            other => LlmError::RetriesExhausted {
                attempts: attempt + 1,
                status: other.label(),
                detail: other.detail().to_string(),
            },
        };
        debug!(attempt, %error, "RetryPolicy::decide: giving up");
        RetryDecision::GiveUp(error)
    }
}

/// Diagnostic sink for the retry loop
pub trait RetryObserver: Send + Sync {
    /// Called before sleeping ahead of the next attempt
    fn on_retry(&self, attempt: u32, delay: Duration, failure: &AttemptFailure);

    /// Called once when the loop gives up
    fn on_give_up(&self, _attempts: u32, _error: &LlmError) {}
}

/// Observer that reports retries through `tracing`
#[derive(Debug, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_retry(&self, attempt: u32, delay: Duration, failure: &AttemptFailure) {
        warn!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            %failure,
            "generate: retrying after transient error"
        );
    }

    fn on_give_up(&self, attempts: u32, error: &LlmError) {
        warn!(attempts, %error, "generate: giving up");
    }
}
