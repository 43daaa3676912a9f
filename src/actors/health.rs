use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resilience::CircuitState;

// ============================================================================
// Health Types
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded(_) => "degraded",
            HealthStatus::Unhealthy(_) => "unhealthy",
        }
    }

    pub fn as_gauge(&self) -> i64 {
        match self {
            HealthStatus::Unhealthy(_) => 0,
            HealthStatus::Degraded(_) => 1,
            HealthStatus::Healthy => 2,
        }
    }

    /// Degraded still serves traffic
    pub fn is_serving(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy(_))
    }

    pub fn from_breaker(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
            CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
        }
    }
}

/// Health information for a component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

impl SystemHealth {
    /// Nothing reported yet
    pub fn starting() -> Self {
        Self {
            overall: HealthStatus::Healthy,
            components: BTreeMap::new(),
            check_time: Utc::now(),
        }
    }

    pub fn from_components(components: BTreeMap<String, ComponentHealth>) -> Self {
        let mut unhealthy = Vec::new();
        let mut has_degraded = false;

        for (name, health) in &components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => unhealthy.push(format!("{}: {}", name, msg)),
                HealthStatus::Degraded(_) => has_degraded = true,
                HealthStatus::Healthy => {}
            }
        }

        let overall = if !unhealthy.is_empty() {
            HealthStatus::Unhealthy(unhealthy.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        };

        Self {
            overall,
            components,
            check_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(status: HealthStatus) -> ComponentHealth {
        ComponentHealth { status, last_check: Utc::now(), details: None }
    }

    #[test]
    fn test_worst_component_wins() {
        let mut components = BTreeMap::new();
        components.insert("redpanda".to_string(), component(HealthStatus::Healthy));
        components.insert("order_lookup".to_string(), component(HealthStatus::from_breaker(CircuitState::HalfOpen)));
        assert_eq!(SystemHealth::from_components(components.clone()).overall.as_str(), "degraded");

        components.insert("redpanda".to_string(), component(HealthStatus::from_breaker(CircuitState::Open)));
        let health = SystemHealth::from_components(components);
        assert!(!health.overall.is_serving());
        assert!(matches!(health.overall, HealthStatus::Unhealthy(ref msg) if msg.contains("redpanda")));
    }

    #[test]
    fn test_status_json_shape() {
        let json = serde_json::to_value(HealthStatus::Degraded("probing".to_string())).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["reason"], "probing");
    }
}
