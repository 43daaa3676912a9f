use kameo::Actor;
use kameo::message::{Context, Message};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::reply::{Reply, ReplyError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::watch;

use crate::metrics::Metrics;
use crate::resilience::CircuitBreaker;
use super::health::{ComponentHealth, HealthStatus, SystemHealth};

// ============================================================================
// Health Monitor Actor - Monitors system health
// ============================================================================
//
// - Polls every watched circuit breaker (order lookup, Redpanda)
// - Accepts pushed component updates
// - Aggregates a system-wide status
// - Publishes each new snapshot on a watch channel for /health
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Debug)]
pub struct GetSystemHealth;

// Implement Reply for SystemHealth to use it as a message reply type
impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: BTreeMap<String, ComponentHealth>,
    breakers: Vec<CircuitBreaker>,
    poll_interval: Duration,
    publisher: watch::Sender<SystemHealth>,
    metrics: Option<Arc<Metrics>>,
}

impl HealthMonitorActor {
    pub fn new(publisher: watch::Sender<SystemHealth>) -> Self {
        Self {
            components: BTreeMap::new(),
            breakers: Vec::new(),
            poll_interval: Duration::from_secs(10),
            publisher,
            metrics: None,
        }
    }

    /// Report this breaker's state as the component of the same name
    pub fn watch_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breakers.push(breaker);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn snapshot(&self) -> SystemHealth {
        SystemHealth::from_components(self.components.clone())
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(
        state: Self::Args,
        actor_ref: ActorRef<Self>
    ) -> Result<Self, Self::Error> {
        tracing::info!(breakers = state.breakers.len(), "HealthMonitorActor started");

        let breakers = state.breakers.clone();
        let poll_interval = state.poll_interval;

        // Periodic breaker checks
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                interval.tick().await;

                for breaker in &breakers {
                    let status = HealthStatus::from_breaker(breaker.get_state().await);

                    let sent = actor_ref
                        .tell(UpdateHealth {
                            component: breaker.name().to_string(),
                            status,
                            details: None,
                        })
                        .send()
                        .await;

                    if sent.is_err() {
                        tracing::debug!("HealthMonitorActor gone, stopping breaker polling");
                        return;
                    }
                }
            }
        });

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let changed = self
            .components
            .get(&msg.component)
            .map(|current| current.status != msg.status)
            .unwrap_or(true);

        if changed {
            tracing::info!(component = %msg.component, status = ?msg.status, "Component health changed");
        } else {
            tracing::debug!(component = %msg.component, status = ?msg.status, "Updated component health");
        }

        if let Some(ref metrics) = self.metrics {
            metrics.update_component_health(&msg.component, msg.status.as_gauge());
        }

        self.components.insert(
            msg.component,
            ComponentHealth {
                status: msg.status,
                last_check: Utc::now(),
                details: msg.details,
            },
        );

        self.publisher.send_replace(self.snapshot());
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kameo::prelude::*;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};

    #[tokio::test]
    async fn test_pushed_updates_are_aggregated_and_published() {
        let (tx, rx) = watch::channel(SystemHealth::starting());
        let monitor = HealthMonitorActor::spawn(HealthMonitorActor::new(tx));

        monitor
            .tell(UpdateHealth {
                component: "scylla".to_string(),
                status: HealthStatus::Degraded("slow".to_string()),
                details: Some("p99 above 1s".to_string()),
            })
            .send()
            .await
            .unwrap();

        let health = monitor.ask(GetSystemHealth).await.unwrap();
        assert_eq!(health.overall.as_str(), "degraded");
        assert_eq!(rx.borrow().overall.as_str(), "degraded");
    }

    #[tokio::test]
    async fn test_open_breaker_reported_unhealthy() {
        let breaker = CircuitBreaker::new(
            "order_lookup",
            CircuitBreakerConfig { failure_threshold: 1, ..Default::default() },
        );
        let _ = breaker.call(async { Err::<(), _>("down") }).await;
        assert_eq!(breaker.get_state().await, CircuitState::Open);

        let (tx, mut rx) = watch::channel(SystemHealth::starting());
        let _monitor = HealthMonitorActor::spawn(
            HealthMonitorActor::new(tx)
                .watch_breaker(breaker)
                .with_poll_interval(Duration::from_millis(10)),
        );

        tokio::time::timeout(Duration::from_secs(2), rx.changed()).await.unwrap().unwrap();
        let health = rx.borrow().clone();
        assert!(!health.overall.is_serving());
        assert!(health.components.contains_key("order_lookup"));
    }
}
