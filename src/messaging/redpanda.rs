use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use rdkafka::{
    producer::{FutureProducer, FutureRecord},
    config::ClientConfig,
};
use anyhow::Result;

use crate::metrics::Metrics;
use crate::resilience::{
    retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
    RetryConfig,
};
use super::EventSink;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const PUBLISH_OPERATION: &str = "redpanda_publish";

/// Kafka-compatible producer guarded by its own circuit breaker
pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl RedpandaClient {
    pub fn new(brokers: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()?;

        // Open after 5 failures, probe again after 30s, one success closes
        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 1,
            half_open_max_calls: 1,
            call_timeout: SEND_TIMEOUT + Duration::from_secs(1),
        };

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("redpanda", cb_config),
            retry: RetryConfig::publish(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub async fn get_circuit_breaker_state(&self) -> CircuitState {
        self.circuit_breaker.get_state().await
    }

    async fn send_once(&self, topic: &str, key: &str, payload: &str) -> Result<()> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(topic).key(key).payload(payload);

                self.producer
                    .send(record, rdkafka::util::Timeout::After(SEND_TIMEOUT))
                    .await
                    .map_err(|(e, _)| anyhow::anyhow!("Kafka send error: {}", e))?;

                Ok::<(), anyhow::Error>(())
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(CircuitBreakerError::CircuitOpen) => {
                Err(anyhow::anyhow!("Circuit breaker open for Redpanda"))
            }
            Err(CircuitBreakerError::Timeout(after)) => {
                Err(anyhow::anyhow!("Redpanda send timed out after {:?}", after))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
        }
    }
}

#[async_trait]
impl EventSink for RedpandaClient {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<()> {
        let mut attempts = 0;
        let result = retry_with_backoff(&self.retry, |attempt| {
            attempts = attempt;
            if attempt > 1 {
                if let Some(ref metrics) = self.metrics {
                    metrics.record_retry_attempt(PUBLISH_OPERATION, attempt);
                }
            }
            self.send_once(topic, key, payload)
        })
        .await;

        if let Some(ref metrics) = self.metrics {
            metrics.record_publish(topic, result.is_ok());
            if attempts > 1 {
                metrics.record_retry_outcome(PUBLISH_OPERATION, result.is_ok());
            }
        }

        match result {
            Ok(()) => {
                tracing::info!(
                    topic = %topic,
                    key = %key,
                    "Published to Redpanda"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    topic = %topic,
                    "Failed to publish to Redpanda"
                );
                Err(e)
            }
        }
    }
}
