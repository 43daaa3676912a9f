// ============================================================================
// Resilience - breaker, retry, guarded order lookup
// ============================================================================

pub mod circuit_breaker;
pub mod retry;
pub mod order_lookup;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use retry::{retry_on_transient, retry_with_backoff, IsTransient, RetryConfig};
pub use order_lookup::{
    HttpOrderService, LocalOrderService, OrderLookupError, OrderService, ResilientOrderClient,
};
