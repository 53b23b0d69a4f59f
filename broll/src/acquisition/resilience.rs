//! Circuit breaker and retry executor for provider calls.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::providers::ProviderError;
use super::source::Source;
use crate::database::models::NewApiCall;
use crate::database::repositories::ApiCallRepository;
use crate::database::time::duration_to_ms;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Per-source failure counter that stops traffic after repeated failures.
///
/// The circuit is open while `failure_count >= threshold` and the last failure
/// is younger than the cooldown. When a check finds the cooldown elapsed it
/// zeroes the counter, so the source is probed again and has to accumulate a
/// full `threshold` of new failures before it reopens.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            failure_threshold,
            cooldown,
        }
    }

    /// Check whether calls must be skipped right now.
    ///
    /// Not a pure read: an expired open circuit is reset here.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();
        if state.failure_count < self.failure_threshold {
            return false;
        }

        match state.last_failure {
            Some(at) if at.elapsed() < self.cooldown => true,
            _ => {
                state.failure_count = 0;
                info!("Circuit breaker cooldown elapsed, closing");
                false
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.failure_count >= self.failure_threshold {
            info!("Circuit breaker closed after success");
        }
        state.failure_count = 0;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(Instant::now());
        if state.failure_count == self.failure_threshold {
            warn!(
                "Circuit breaker opened after {} consecutive failures",
                state.failure_count
            );
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Circuit breakers keyed by source, created on first use.
///
/// One manager lives for one pipeline run and is shared by every worker.
pub struct CircuitBreakerManager {
    breakers: RwLock<HashMap<Source, Arc<CircuitBreaker>>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreakerManager {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            failure_threshold,
            cooldown,
        }
    }

    pub fn get(&self, source: Source) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read();
            if let Some(breaker) = breakers.get(&source) {
                return breaker.clone();
            }
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(source)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.failure_threshold, self.cooldown)))
            .clone()
    }

    pub fn is_open(&self, source: Source) -> bool {
        let open = self.get(source).is_open();
        if open {
            debug!(source = %source, "Circuit open");
        }
        open
    }

    pub fn record_success(&self, source: Source) {
        self.get(source).record_success();
    }

    pub fn record_failure(&self, source: Source) {
        self.get(source).record_failure();
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Bounded exponential backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Sleep after the zero-based `attempt` fails: `base_delay * 2^attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs one provider operation with retries, recording every attempt.
///
/// Each attempt appends a call record and updates the source's breaker, so a
/// transient failure is visible to health tracking even when a later retry
/// succeeds.
pub struct RetryExecutor {
    breakers: Arc<CircuitBreakerManager>,
    calls: Arc<dyn ApiCallRepository>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(
        breakers: Arc<CircuitBreakerManager>,
        calls: Arc<dyn ApiCallRepository>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            breakers,
            calls,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn execute<T, F, Fut>(
        &self,
        source: Source,
        query: &str,
        mut operation: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            let started = Instant::now();
            let result = operation().await;
            let elapsed_ms = duration_to_ms(started.elapsed());

            match result {
                Ok(value) => {
                    self.log_call(NewApiCall::success(source.as_str(), query, elapsed_ms))
                        .await;
                    self.breakers.record_success(source);
                    return Ok(value);
                }
                Err(error) => {
                    self.log_call(NewApiCall::failure(
                        source.as_str(),
                        query,
                        elapsed_ms,
                        error.to_string(),
                    ))
                    .await;
                    self.breakers.record_failure(source);

                    warn!(
                        source = %source,
                        query = %query,
                        attempt = attempt + 1,
                        max_attempts,
                        elapsed_ms,
                        error = %error,
                        "Provider call failed"
                    );

                    if attempt + 1 >= max_attempts {
                        return Err(error);
                    }

                    tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn log_call(&self, call: NewApiCall) {
        if let Err(e) = self.calls.record(&call).await {
            warn!(source = %call.source, error = %e, "Failed to record provider call");
        }
    }
}
