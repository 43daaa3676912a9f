use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use anyhow::{Result, bail};

// ============================================================================
// Event Envelope - Cross-Service Event Metadata
// ============================================================================
//
// Every notification that crosses a service boundary is wrapped in an
// envelope. The envelope is immutable once built: fields are private and
// only exposed through accessors.
//
// Wire shape (stable field names):
//   { "eventId", "eventType", "timestamp", "correlationId", "payload" }
//
// ============================================================================

/// Envelope around a domain event payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    timestamp: DateTime<Utc>,
    correlation_id: Uuid,
    payload: E,
}

impl<E: DomainEvent> EventEnvelope<E> {
    /// Wrap a payload, starting a new correlation chain
    pub fn new(payload: E) -> Self {
        Self::with_correlation(payload, None)
    }

    /// Wrap a payload, continuing the upstream correlation id when one exists
    pub fn with_correlation(payload: E, correlation_id: Option<Uuid>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: E::event_type().to_string(),
            timestamp: Utc::now(),
            correlation_id: correlation_id.unwrap_or_else(Uuid::new_v4),
            payload,
        }
    }

    /// Topic this envelope is published to
    pub fn topic(&self) -> &'static str {
        E::topic()
    }

    /// Partition key: the owning aggregate id, so that one aggregate's events
    /// land on one partition and keep their order
    pub fn partition_key(&self) -> String {
        self.payload.aggregate_id().to_string()
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// Payload carried by an envelope.
///
/// Each payload type owns exactly one topic and names the aggregate whose
/// id is used as partition key.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn event_type() -> &'static str;
    fn topic() -> &'static str;
    fn aggregate_id(&self) -> Uuid;
}

// ============================================================================
// Envelope Serialization Helpers
// ============================================================================

pub fn serialize_envelope<E: DomainEvent>(envelope: &EventEnvelope<E>) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode an envelope and check that its tag matches the expected payload type
pub fn decode_envelope<E: DomainEvent>(bytes: &[u8]) -> Result<EventEnvelope<E>> {
    let envelope: EventEnvelope<E> = serde_json::from_slice(bytes)?;
    if envelope.event_type != E::event_type() {
        bail!(
            "Unexpected event type: expected {}, got {}",
            E::event_type(),
            envelope.event_type
        );
    }
    Ok(envelope)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct TestEvent {
        order_id: Uuid,
    }

    impl DomainEvent for TestEvent {
        fn event_type() -> &'static str { "TestEvent" }
        fn topic() -> &'static str { "test.events" }
        fn aggregate_id(&self) -> Uuid { self.order_id }
    }

    #[test]
    fn test_envelope_defaults_fresh_correlation() {
        let order_id = Uuid::new_v4();
        let first = EventEnvelope::new(TestEvent { order_id });
        let second = EventEnvelope::new(TestEvent { order_id });

        assert_eq!(first.event_type(), "TestEvent");
        assert_eq!(first.topic(), "test.events");
        assert_eq!(first.partition_key(), order_id.to_string());
        assert_ne!(first.event_id(), second.event_id());
        assert_ne!(first.correlation_id(), second.correlation_id());
    }

    #[test]
    fn test_event_ids_are_time_ordered() {
        let first = EventEnvelope::new(TestEvent { order_id: Uuid::new_v4() });
        let second = EventEnvelope::new(TestEvent { order_id: Uuid::new_v4() });

        assert_eq!(first.event_id().get_version_num(), 7);
        assert!(first.event_id() < second.event_id());
    }

    #[test]
    fn test_envelope_propagates_correlation() {
        let correlation_id = Uuid::new_v4();
        let envelope = EventEnvelope::with_correlation(
            TestEvent { order_id: Uuid::new_v4() },
            Some(correlation_id),
        );

        assert_eq!(envelope.correlation_id(), correlation_id);
    }

    #[test]
    fn test_envelope_wire_field_names() {
        let envelope = EventEnvelope::new(TestEvent { order_id: Uuid::new_v4() });
        let json: serde_json::Value =
            serde_json::from_str(&serialize_envelope(&envelope).unwrap()).unwrap();

        for field in ["eventId", "eventType", "timestamp", "correlationId", "payload"] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
    }

    #[test]
    fn test_decode_rejects_wrong_event_type() {
        let json = serde_json::json!({
            "eventId": Uuid::new_v4(),
            "eventType": "SomethingElse",
            "timestamp": Utc::now(),
            "correlationId": Uuid::new_v4(),
            "payload": { "order_id": Uuid::new_v4() }
        });

        let result = decode_envelope::<TestEvent>(json.to_string().as_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(decode_envelope::<TestEvent>(b"not json").is_err());
    }
}
