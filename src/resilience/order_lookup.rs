use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::order::OrderSnapshot;
use crate::store::OrderRepository;
use super::circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};

// ============================================================================
// Order Lookup - the one synchronous cross-service call
// ============================================================================
//
// Billing reads the order snapshot through ResilientOrderClient:
//
//   Closed    → call passes through, bounded by the call timeout
//   Open      → fails immediately with Unavailable (never stale data)
//   HalfOpen  → limited probes decide whether to close or reopen
//
// "Order does not exist" is an answer, not a failure: it does not count
// against the breaker.
//
// ============================================================================

#[async_trait]
pub trait OrderService: Send + Sync {
    async fn get_order(&self, order_id: Uuid) -> anyhow::Result<Option<OrderSnapshot>>;
}

#[derive(Debug, thiserror::Error)]
pub enum OrderLookupError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order service unavailable: {0}")]
    Unavailable(String),
}

pub struct ResilientOrderClient {
    service: Arc<dyn OrderService>,
    breaker: CircuitBreaker,
}

impl ResilientOrderClient {
    pub fn new(service: Arc<dyn OrderService>, breaker: CircuitBreaker) -> Self {
        Self { service, breaker }
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn state(&self) -> CircuitState {
        self.breaker.get_state().await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderSnapshot, OrderLookupError> {
        let result = self.breaker.call(self.service.get_order(order_id)).await;

        match result {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => Err(OrderLookupError::NotFound(order_id)),
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::warn!(
                    order_id = %order_id,
                    breaker = %self.breaker.name(),
                    "Order lookup rejected, circuit open"
                );
                Err(OrderLookupError::Unavailable("circuit open".to_string()))
            }
            Err(CircuitBreakerError::Timeout(after)) => {
                Err(OrderLookupError::Unavailable(format!("timed out after {:?}", after)))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::warn!(order_id = %order_id, error = %e, "Order lookup failed");
                Err(OrderLookupError::Unavailable(e.to_string()))
            }
        }
    }
}

// ============================================================================
// Order Service Adapters
// ============================================================================

/// Remote orders service over HTTP
pub struct HttpOrderService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrderService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn order_url(&self, order_id: Uuid) -> String {
        format!("{}/api/orders/{}", self.base_url, order_id)
    }
}

#[async_trait]
impl OrderService for HttpOrderService {
    async fn get_order(&self, order_id: Uuid) -> anyhow::Result<Option<OrderSnapshot>> {
        let response = self.client.get(self.order_url(order_id)).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let snapshot = response.error_for_status()?.json::<OrderSnapshot>().await?;
        Ok(Some(snapshot))
    }
}

/// In-process lookup when orders and billing share a deployment
pub struct LocalOrderService {
    repository: Arc<dyn OrderRepository>,
}

impl LocalOrderService {
    pub fn new(repository: Arc<dyn OrderRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl OrderService for LocalOrderService {
    async fn get_order(&self, order_id: Uuid) -> anyhow::Result<Option<OrderSnapshot>> {
        let order = self.repository.get(order_id).await?;
        Ok(order.map(|order| order.snapshot()))
    }
}
