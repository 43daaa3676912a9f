use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use async_trait::async_trait;

use crate::events::{decode_envelope, DomainEvent, EventEnvelope};
use super::EventSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

/// Records every publication; can be switched to fail for outage tests
#[derive(Default)]
pub struct InMemoryEventSink {
    messages: Mutex<Vec<PublishedMessage>>,
    failing: AtomicBool,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn published(&self, topic: &str) -> Vec<PublishedMessage> {
        self.messages()
            .into_iter()
            .filter(|message| message.topic == topic)
            .collect()
    }

    /// Decode every envelope published on the event's topic
    pub fn decode<E: DomainEvent>(&self) -> anyhow::Result<Vec<EventEnvelope<E>>> {
        self.published(E::topic())
            .iter()
            .map(|message| decode_envelope::<E>(message.payload.as_bytes()))
            .collect()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("event sink unavailable");
        }

        let mut messages = self
            .messages
            .lock()
            .map_err(|_| anyhow::anyhow!("event sink lock poisoned"))?;
        messages.push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use crate::events::{topics, DishReadyEvent};
    use crate::messaging::{publish_best_effort, publish_event};

    fn dish_ready() -> EventEnvelope<DishReadyEvent> {
        EventEnvelope::new(DishReadyEvent {
            kitchen_queue_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            order_item_id: Uuid::new_v4(),
            dish_name: "Ramen".to_string(),
            quantity: 1,
            ready_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_publish_records_topic_and_key() {
        let sink = InMemoryEventSink::new();
        let envelope = dish_ready();

        publish_event(&sink, &envelope).await.unwrap();

        let published = sink.published(topics::KITCHEN_DISH_READY);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, envelope.payload().order_id.to_string());

        let decoded = sink.decode::<DishReadyEvent>().unwrap();
        assert_eq!(decoded[0].event_id(), envelope.event_id());
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let sink = InMemoryEventSink::new();
        sink.set_failing(true);

        publish_best_effort(&sink, &dish_ready()).await;
        assert!(sink.messages().is_empty());

        sink.set_failing(false);
        publish_best_effort(&sink, &dish_ready()).await;
        assert_eq!(sink.messages().len(), 1);
    }
}
