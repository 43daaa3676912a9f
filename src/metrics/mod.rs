// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGaugeVec, Opts, Registry,
};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// - Bus publishing (per topic, success / failure)
// - Event consumption (throughput, failures by reason, latency)
// - Dead-lettered messages
// - Circuit breaker state and transitions (per breaker)
// - Retry attempts and outcomes
// - Component health as seen by the health monitor
//
// Everything is registered on one Registry scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Publishing
    pub events_published: IntCounterVec,
    pub events_publish_failed: IntCounterVec,

    // Consumption
    pub events_consumed: IntCounterVec,
    pub events_failed: IntCounterVec,
    pub event_handling_duration: HistogramVec,

    // Dead letters
    pub dead_letters_total: IntCounter,
    pub dead_letters_by_topic: IntCounterVec,

    // Circuit breakers
    pub circuit_breaker_state: IntGaugeVec,
    pub circuit_breaker_transitions: IntCounterVec,

    // Retries
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    // Health
    pub component_health: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Events published to the bus"),
            &["topic"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let events_publish_failed = IntCounterVec::new(
            Opts::new("events_publish_failed_total", "Events that could not be published"),
            &["topic"],
        )?;
        registry.register(Box::new(events_publish_failed.clone()))?;

        let events_consumed = IntCounterVec::new(
            Opts::new("events_consumed_total", "Events consumed and handled"),
            &["topic"],
        )?;
        registry.register(Box::new(events_consumed.clone()))?;

        let events_failed = IntCounterVec::new(
            Opts::new("events_failed_total", "Consumed events that failed handling"),
            &["topic", "reason"],
        )?;
        registry.register(Box::new(events_failed.clone()))?;

        let event_handling_duration = HistogramVec::new(
            HistogramOpts::new("event_handling_duration_seconds", "Event handling duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["topic"],
        )?;
        registry.register(Box::new(event_handling_duration.clone()))?;

        let dead_letters_total = IntCounter::new(
            "dead_letters_total",
            "Messages parked after failed handling",
        )?;
        registry.register(Box::new(dead_letters_total.clone()))?;

        let dead_letters_by_topic = IntCounterVec::new(
            Opts::new("dead_letters_by_topic", "Parked messages by topic"),
            &["topic"],
        )?;
        registry.register(Box::new(dead_letters_by_topic.clone()))?;

        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new(
                "circuit_breaker_state",
                "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
            ),
            &["breaker"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["breaker", "from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Operations that succeeded within the retry budget"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Operations that failed after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new(
                "component_health_status",
                "Component health status (0=Unhealthy, 1=Degraded, 2=Healthy)",
            ),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            registry,
            events_published,
            events_publish_failed,
            events_consumed,
            events_failed,
            event_handling_duration,
            dead_letters_total,
            dead_letters_by_topic,
            circuit_breaker_state,
            circuit_breaker_transitions,
            retry_attempts_total,
            retry_success,
            retry_failure,
            component_health,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_publish(&self, topic: &str, success: bool) {
        if success {
            self.events_published.with_label_values(&[topic]).inc();
        } else {
            self.events_publish_failed.with_label_values(&[topic]).inc();
        }
    }

    /// Record one consumed message; `failure` carries the reason label
    pub fn record_consumed(&self, topic: &str, duration_secs: f64, failure: Option<&str>) {
        match failure {
            None => self.events_consumed.with_label_values(&[topic]).inc(),
            Some(reason) => self.events_failed.with_label_values(&[topic, reason]).inc(),
        }
        self.event_handling_duration.with_label_values(&[topic]).observe(duration_secs);
    }

    pub fn record_dead_letter(&self, topic: &str) {
        self.dead_letters_total.inc();
        self.dead_letters_by_topic.with_label_values(&[topic]).inc();
    }

    pub fn update_circuit_breaker_state(&self, breaker: &str, state: i64) {
        self.circuit_breaker_state.with_label_values(&[breaker]).set(state);
    }

    pub fn record_circuit_breaker_transition(&self, breaker: &str, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions
            .with_label_values(&[breaker, from_state, to_state])
            .inc();
    }

    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total.with_label_values(&[operation, &attempt.to_string()]).inc();
    }

    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    pub fn update_component_health(&self, component: &str, status: i64) {
        self.component_health.with_label_values(&[component]).set(status);
    }
}
