// ============================================================================
// Messaging - Event Bus Adapters
// ============================================================================
//
// Publishing goes through the EventSink port, which managers receive
// explicitly at construction:
//
//   manager ──► publish_best_effort(envelope) ──► EventSink::publish(topic, key, json)
//
// Publishing is best-effort. The aggregate is already committed when the
// event goes out; a failed publish is logged and counted, never rolled back.
//
// Consumption (listener.rs) routes each message by topic to an EventHandler
// and commits the offset after handling.
//
// ============================================================================

mod memory;
mod redpanda;
mod listener;

pub use memory::{InMemoryEventSink, PublishedMessage};
pub use redpanda::RedpandaClient;
pub use listener::{
    DeadLetterSink, EventDispatcher, EventHandler, EventListener, HandlerError,
    KitchenEventHandler, OrderEventHandler,
};

use async_trait::async_trait;

use crate::events::{serialize_envelope, DomainEvent, EventEnvelope};

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish a serialized envelope to `topic`, partitioned by `key`
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> anyhow::Result<()>;
}

/// Serialize and publish one envelope
pub async fn publish_event<E: DomainEvent>(
    sink: &dyn EventSink,
    envelope: &EventEnvelope<E>,
) -> anyhow::Result<()> {
    let payload = serialize_envelope(envelope)?;
    sink.publish(envelope.topic(), &envelope.partition_key(), &payload).await
}

/// Publish without failing the caller; local state stays the source of truth
pub async fn publish_best_effort<E: DomainEvent>(sink: &dyn EventSink, envelope: &EventEnvelope<E>) {
    match publish_event(sink, envelope).await {
        Ok(()) => {
            tracing::debug!(
                topic = envelope.topic(),
                event_id = %envelope.event_id(),
                correlation_id = %envelope.correlation_id(),
                "Event published"
            );
        }
        Err(e) => {
            tracing::error!(
                topic = envelope.topic(),
                event_id = %envelope.event_id(),
                key = %envelope.partition_key(),
                error = %e,
                "Failed to publish event; committed state is kept"
            );
        }
    }
}
