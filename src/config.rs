use std::str::FromStr;
use std::time::Duration;
use rust_decimal::Decimal;

use crate::domain::billing::BillingPolicy;
use crate::resilience::CircuitBreakerConfig;

/// Service configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | REDPANDA_BROKERS | 127.0.0.1:9092 | bootstrap servers |
/// | CONSUMER_GROUP | restaurant-fulfillment | consumer group id |
/// | SCYLLA_NODES | (unset: in-memory store) | comma-separated nodes |
/// | SCYLLA_KEYSPACE | restaurant_ks | keyspace |
/// | ORDER_SERVICE_URL | (unset: in-process lookup) | orders service base URL |
/// | ORDER_LOOKUP_TIMEOUT_MS | 2000 | bound on one order lookup |
/// | BREAKER_FAILURE_THRESHOLD | 5 | consecutive failures to open |
/// | BREAKER_COOLDOWN_MS | 30000 | open → half-open delay |
/// | BREAKER_HALF_OPEN_PROBES | 1 | concurrent probes while half-open |
/// | BREAKER_SUCCESS_THRESHOLD | 1 | probe successes to close |
/// | TAX_RATE | 0.10 | tax on the order subtotal |
/// | SERVICE_CHARGE_RATE | 0.05 | service charge on the order subtotal |
/// | METRICS_PORT | 9090 | /metrics and /health port |
///
/// A `.env` file in the working directory is loaded first, if present.
#[derive(Debug, Clone)]
pub struct Config {
    pub redpanda_brokers: String,
    pub consumer_group: String,
    pub scylla_nodes: Vec<String>,
    pub scylla_keyspace: String,
    pub order_service_url: Option<String>,
    pub order_lookup_timeout_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_ms: u64,
    pub breaker_half_open_probes: u32,
    pub breaker_success_threshold: u32,
    pub tax_rate: Decimal,
    pub service_charge_rate: Decimal,
    pub metrics_port: u16,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = key, value = %raw, "Malformed config value, using default");
                default
            }
        },
    }
}

impl Config {
    /// Load `.env`, then read the environment
    pub fn from_env() -> Self {
        if dotenv::dotenv().is_ok() {
            tracing::debug!("Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            redpanda_brokers: non_empty("REDPANDA_BROKERS").unwrap_or_else(|| "127.0.0.1:9092".into()),
            consumer_group: non_empty("CONSUMER_GROUP").unwrap_or_else(|| "restaurant-fulfillment".into()),
            scylla_nodes: non_empty("SCYLLA_NODES")
                .map(|nodes| {
                    nodes
                        .split(',')
                        .map(str::trim)
                        .filter(|node| !node.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            scylla_keyspace: non_empty("SCYLLA_KEYSPACE").unwrap_or_else(|| "restaurant_ks".into()),
            order_service_url: non_empty("ORDER_SERVICE_URL"),
            order_lookup_timeout_ms: parse_or(&lookup, "ORDER_LOOKUP_TIMEOUT_MS", 2000),
            breaker_failure_threshold: parse_or(&lookup, "BREAKER_FAILURE_THRESHOLD", 5),
            breaker_cooldown_ms: parse_or(&lookup, "BREAKER_COOLDOWN_MS", 30_000),
            breaker_half_open_probes: parse_or(&lookup, "BREAKER_HALF_OPEN_PROBES", 1),
            breaker_success_threshold: parse_or(&lookup, "BREAKER_SUCCESS_THRESHOLD", 1),
            tax_rate: parse_or(&lookup, "TAX_RATE", Decimal::new(10, 2)),
            service_charge_rate: parse_or(&lookup, "SERVICE_CHARGE_RATE", Decimal::new(5, 2)),
            metrics_port: parse_or(&lookup, "METRICS_PORT", 9090),
        }
    }

    pub fn uses_scylla(&self) -> bool {
        !self.scylla_nodes.is_empty()
    }

    pub fn order_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.order_lookup_timeout_ms)
    }

    /// Breaker guarding the order lookup
    pub fn order_lookup_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold.max(1),
            cooldown: Duration::from_millis(self.breaker_cooldown_ms),
            success_threshold: self.breaker_success_threshold.max(1),
            half_open_max_calls: self.breaker_half_open_probes.max(1),
            call_timeout: self.order_lookup_timeout(),
        }
    }

    pub fn billing_policy(&self) -> BillingPolicy {
        BillingPolicy {
            tax_rate: self.tax_rate,
            service_charge_rate: self.service_charge_rate,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
