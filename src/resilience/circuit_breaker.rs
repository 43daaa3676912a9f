use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::metrics::Metrics;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Stops calling a failing dependency for a cooldown window.
//
// States:
// - Closed: calls pass through; consecutive failures trip the breaker
// - Open: calls rejected immediately until the cooldown elapses
// - HalfOpen: a bounded number of probe calls; success closes, failure reopens
//
// Every guarded call runs under `call_timeout`. A timeout counts as a failure.
//
// Each admitted call holds a `Permit` stamped with the generation it was
// admitted in. The generation moves on every transition, so an outcome from
// an earlier generation never counts toward the current state. A permit
// dropped without an outcome (the caller's future was cancelled) gives its
// half-open slot back.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Gauge encoding (0=Closed, 1=Open, 2=HalfOpen)
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Time spent Open before probing
    pub cooldown: Duration,
    /// Probe successes needed to close from HalfOpen
    pub success_threshold: u32,
    /// Concurrent probes allowed while HalfOpen
    pub half_open_max_calls: u32,
    /// Upper bound on a single guarded call
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 1,
            half_open_max_calls: 1,
            call_timeout: Duration::from_secs(2),
        }
    }
}

struct BreakerState {
    state: CircuitState,
    generation: u64,
    failure_count: u32,
    success_count: u32,
    half_open_in_flight: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Abandoned,
}

/// Admission to run one guarded call. Settled exactly once: explicitly
/// through `succeed` / `fail`, or as abandoned when dropped.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    admitted_in: CircuitState,
    generation: u64,
    settled: bool,
}

impl Permit<'_> {
    fn succeed(mut self) {
        self.settled = true;
        self.breaker.settle(self.admitted_in, self.generation, Outcome::Success);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.settle(self.admitted_in, self.generation, Outcome::Failure);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.settle(self.admitted_in, self.generation, Outcome::Abandoned);
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    state: Arc<Mutex<BreakerState>>,
    config: CircuitBreakerConfig,
    metrics: Option<Arc<Metrics>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                failure_count: 0,
                success_count: 0,
                half_open_in_flight: 0,
                opened_at: None,
            })),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        metrics.update_circuit_breaker_state(&self.name, CircuitState::Closed.as_gauge());
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    // Never held across an await
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute an operation under breaker protection and the call timeout
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.try_acquire() else {
            return Err(CircuitBreakerError::CircuitOpen);
        };

        match tokio::time::timeout(self.config.call_timeout, operation).await {
            Ok(Ok(result)) => {
                permit.succeed();
                Ok(result)
            }
            Ok(Err(err)) => {
                permit.fail();
                Err(CircuitBreakerError::OperationFailed(err))
            }
            Err(_) => {
                tracing::warn!(
                    breaker = %self.name,
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "Guarded call timed out"
                );
                permit.fail();
                Err(CircuitBreakerError::Timeout(self.config.call_timeout))
            }
        }
    }

    /// Admit a call, moving Open to HalfOpen once the cooldown has elapsed
    fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.lock();

        if state.state == CircuitState::Open {
            let cooled_down = state
                .opened_at
                .map(|opened| opened.elapsed() >= self.config.cooldown)
                .unwrap_or(true);
            if !cooled_down {
                return None;
            }
            self.transition(&mut state, CircuitState::HalfOpen);
        }

        if state.state == CircuitState::HalfOpen {
            if state.half_open_in_flight >= self.config.half_open_max_calls {
                return None;
            }
            state.half_open_in_flight += 1;
        }

        Some(Permit {
            breaker: self,
            admitted_in: state.state,
            generation: state.generation,
            settled: false,
        })
    }

    fn settle(&self, admitted_in: CircuitState, generation: u64, outcome: Outcome) {
        let mut state = self.lock();

        if generation != state.generation {
            tracing::debug!(
                breaker = %self.name,
                admitted_in = admitted_in.as_str(),
                current = state.state.as_str(),
                outcome = ?outcome,
                "Ignoring outcome of a call admitted before the last transition"
            );
            return;
        }

        match (admitted_in, outcome) {
            (CircuitState::Closed, Outcome::Success) => {
                state.failure_count = 0;
            }
            (CircuitState::Closed, Outcome::Failure) => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, Outcome::Success) => {
                state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            (CircuitState::HalfOpen, Outcome::Failure) => {
                tracing::warn!(breaker = %self.name, "Probe failed, reopening circuit");
                self.transition(&mut state, CircuitState::Open);
            }
            (CircuitState::HalfOpen, Outcome::Abandoned) => {
                tracing::debug!(breaker = %self.name, "Probe cancelled, releasing its slot");
                state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
            }
            // Permits are never issued while Open; a cancelled closed call says nothing
            (CircuitState::Closed, Outcome::Abandoned) | (CircuitState::Open, _) => {}
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.state;
        if from == to {
            return;
        }

        match to {
            CircuitState::Open => {
                tracing::warn!(
                    breaker = %self.name,
                    failures = state.failure_count,
                    cooldown_ms = self.config.cooldown.as_millis() as u64,
                    "Circuit breaker opening"
                );
                state.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "Circuit breaker half-open, probing");
            }
            CircuitState::Closed => {
                tracing::info!(
                    breaker = %self.name,
                    successes = state.success_count,
                    "Circuit breaker closing"
                );
                state.failure_count = 0;
                state.opened_at = None;
            }
        }

        state.state = to;
        state.generation += 1;
        state.success_count = 0;
        state.half_open_in_flight = 0;

        if let Some(ref metrics) = self.metrics {
            metrics.record_circuit_breaker_transition(&self.name, from.as_str(), to.as_str());
            metrics.update_circuit_breaker_state(&self.name, to.as_gauge());
        }
    }

    pub async fn get_state(&self) -> CircuitState {
        self.lock().state
    }

    pub async fn get_failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Manually close the breaker
    pub async fn reset(&self) {
        let mut state = self.lock();
        tracing::info!(breaker = %self.name, "Circuit breaker manually reset");
        self.transition(&mut state, CircuitState::Closed);
        state.failure_count = 0;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation failed: {0}")]
    OperationFailed(E),
}
