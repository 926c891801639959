//! Circuit breaker for model service adapters.
//!
//! Repeated auth failures against a model service mean every subsequent call
//! will fail the same way; the breaker short-circuits those calls instead of
//! letting each pipeline rediscover the broken credential. One breaker per
//! client adapter, with the standard three states:
//!
//! - `Closed` — calls pass through, failures are counted
//! - `Open` — calls are refused until the reset timeout elapses
//! - `HalfOpen` — one probe call is allowed; success closes the breaker,
//!   failure re-opens it
//!
//! Explicit `reset()` returns the breaker to `Closed` regardless of state
//! (operator replaced the key).

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{
    ImageModel, ImageRequest, TextModel, TextRequest, TextResponse, VisionModel, VisionRequest,
};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Per-adapter circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a breaker that opens after `failure_threshold` consecutive
    /// failures and allows a probe after `reset_timeout`.
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Breaker with defaults suitable for model service adapters.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, 3, Duration::from_secs(60))
    }

    /// The adapter name this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gate a call. `Ok` means the call may proceed; `Err(CircuitOpen)` means
    /// the caller must not hit the service. An elapsed reset timeout moves the
    /// breaker to half-open and lets one probe through.
    pub fn check(&self) -> Result<(), LlmError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    tracing::info!(breaker = %self.name, "Circuit breaker half-open, allowing probe");
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(LlmError::CircuitOpen(self.name.clone()))
                }
            }
        }
    }

    /// Record a successful call. Closes the breaker and clears the count.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if inner.state != BreakerState::Closed {
            tracing::info!(breaker = %self.name, "Circuit breaker closed after successful call");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Record a failed call. Auth failures open the breaker immediately;
    /// other non-transient failures open it at the threshold. Transient
    /// failures are the adapter's retry problem, not the breaker's.
    pub fn record_failure(&self, error: &LlmError) {
        if error.is_transient() {
            return;
        }

        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.consecutive_failures += 1;

        let should_open = error.is_auth_failure()
            || inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;

        if should_open && inner.state != BreakerState::Open {
            tracing::warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                error = %error,
                "Circuit breaker opened"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Explicitly reset to closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Current state, for diagnostics.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Consecutive failure count, for diagnostics.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().expect("breaker lock poisoned").consecutive_failures
    }
}

/// Text adapter guarded by a circuit breaker.
pub struct GuardedText {
    inner: Arc<dyn TextModel>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedText {
    pub fn new(inner: Arc<dyn TextModel>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl TextModel for GuardedText {
    async fn generate(&self, request: TextRequest) -> Result<TextResponse, LlmError> {
        self.breaker.check()?;
        match self.inner.generate(request).await {
            Ok(response) => {
                self.breaker.record_success();
                Ok(response)
            }
            Err(error) => {
                self.breaker.record_failure(&error);
                Err(error)
            }
        }
    }
}

/// Vision adapter guarded by a circuit breaker.
pub struct GuardedVision {
    inner: Arc<dyn VisionModel>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedVision {
    pub fn new(inner: Arc<dyn VisionModel>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl VisionModel for GuardedVision {
    async fn analyze(&self, request: VisionRequest) -> Result<String, LlmError> {
        self.breaker.check()?;
        match self.inner.analyze(request).await {
            Ok(verdict) => {
                self.breaker.record_success();
                Ok(verdict)
            }
            Err(error) => {
                self.breaker.record_failure(&error);
                Err(error)
            }
        }
    }
}

/// Image adapter guarded by a circuit breaker.
pub struct GuardedImage {
    inner: Arc<dyn ImageModel>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedImage {
    pub fn new(inner: Arc<dyn ImageModel>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl ImageModel for GuardedImage {
    async fn create_image(&self, request: ImageRequest) -> Result<Option<Vec<u8>>, LlmError> {
        self.breaker.check()?;
        match self.inner.create_image(request).await {
            Ok(payload) => {
                self.breaker.record_success();
                Ok(payload)
            }
            Err(error) => {
                self.breaker.record_failure(&error);
                Err(error)
            }
        }
    }
}
