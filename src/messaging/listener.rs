use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use uuid::Uuid;

use crate::actors::DeadLetter;
use crate::domain::kitchen::KitchenPort;
use crate::domain::order::OrderLifecycleManager;
use crate::events::{decode_envelope, topics, DishReadyEvent, OrderSentToKitchenEvent};
use crate::metrics::Metrics;

// ============================================================================
// Event Consumption
// ============================================================================
//
//   StreamConsumer ──► EventDispatcher::dispatch(topic, key, payload)
//                          │
//                          ├─► EventHandler (by topic)
//                          └─► on failure: log, count, park as dead letter
//                      commit offset
//
// Offsets are committed manually after dispatch, whatever the outcome.
// A crash before the commit redelivers the message, which every handler
// tolerates because handlers are idempotent.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Undecodable message: {0}")]
    Decode(#[source] anyhow::Error),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("No handler registered for topic {0}")]
    UnknownTopic(String),
}

impl HandlerError {
    pub fn reason(&self) -> &'static str {
        match self {
            HandlerError::Decode(_) => "decode",
            HandlerError::Handler(_) => "handler",
            HandlerError::UnknownTopic(_) => "unknown_topic",
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn topics(&self) -> &'static [&'static str];

    async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Where failed messages go
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn park(&self, letter: DeadLetter);
}

// ============================================================================
// Handlers
// ============================================================================

/// kitchen.dish-ready → order lifecycle
pub struct OrderEventHandler {
    manager: Arc<OrderLifecycleManager>,
}

impl OrderEventHandler {
    pub fn new(manager: Arc<OrderLifecycleManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl EventHandler for OrderEventHandler {
    fn topics(&self) -> &'static [&'static str] {
        &[topics::KITCHEN_DISH_READY]
    }

    async fn handle(&self, _topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        let envelope = decode_envelope::<DishReadyEvent>(payload).map_err(HandlerError::Decode)?;

        self.manager
            .handle_dish_ready(&envelope)
            .await
            .map_err(|e| HandlerError::Handler(e.to_string()))?;
        Ok(())
    }
}

/// orders.sent-to-kitchen → kitchen queue
pub struct KitchenEventHandler {
    kitchen: Arc<dyn KitchenPort>,
}

impl KitchenEventHandler {
    pub fn new(kitchen: Arc<dyn KitchenPort>) -> Self {
        Self { kitchen }
    }
}

#[async_trait]
impl EventHandler for KitchenEventHandler {
    fn topics(&self) -> &'static [&'static str] {
        &[topics::ORDERS_SENT_TO_KITCHEN]
    }

    async fn handle(&self, _topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        let envelope = decode_envelope::<OrderSentToKitchenEvent>(payload).map_err(HandlerError::Decode)?;

        self.kitchen
            .enqueue_order(envelope.payload(), Some(envelope.correlation_id()))
            .await
            .map_err(|e| HandlerError::Handler(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    metrics: Option<Arc<Metrics>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Arc<dyn EventHandler>) -> Self {
        for topic in handler.topics() {
            self.handlers.insert(*topic, handler.clone());
        }
        self
    }

    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn topics(&self) -> Vec<&'static str> {
        let mut topics: Vec<&'static str> = self.handlers.keys().copied().collect();
        topics.sort_unstable();
        topics
    }

    pub async fn dispatch(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<(), HandlerError> {
        let started = Instant::now();

        let result = match self.handlers.get(topic) {
            Some(handler) => handler.handle(topic, payload).await,
            None => Err(HandlerError::UnknownTopic(topic.to_string())),
        };

        if let Some(ref metrics) = self.metrics {
            let failure = result.as_ref().err().map(HandlerError::reason);
            metrics.record_consumed(topic, started.elapsed().as_secs_f64(), failure);
        }

        if let Err(ref e) = result {
            tracing::warn!(
                topic = %topic,
                key = ?key,
                reason = e.reason(),
                error = %e,
                "Event handling failed, message dropped from the stream"
            );

            if let Some(ref sink) = self.dead_letters {
                sink.park(DeadLetter {
                    id: Uuid::new_v4(),
                    topic: topic.to_string(),
                    key: key.map(str::to_string),
                    payload: String::from_utf8_lossy(payload).into_owned(),
                    reason: e.reason(),
                    error_message: e.to_string(),
                    failed_at: Utc::now(),
                })
                .await;
            }
        }

        result
    }
}

// ============================================================================
// Listener
// ============================================================================

pub struct EventListener {
    consumer: StreamConsumer,
    dispatcher: Arc<EventDispatcher>,
}

impl EventListener {
    pub fn new(brokers: &str, group_id: &str, dispatcher: Arc<EventDispatcher>) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")  // Manual commit for at-least-once
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()?;

        let topics = dispatcher.topics();
        consumer.subscribe(&topics)?;

        tracing::info!(group_id = %group_id, topics = ?topics, "📥 Event listener subscribed");

        Ok(Self { consumer, dispatcher })
    }

    /// Consume until the task is dropped
    pub async fn run(self) {
        let mut stream = self.consumer.stream();

        while let Some(msg_result) = stream.next().await {
            let message = match msg_result {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to receive message");
                    continue;
                }
            };

            let key = message.key().and_then(|k| std::str::from_utf8(k).ok());
            let payload = message.payload().unwrap_or_default();

            tracing::trace!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "Received event"
            );

            // Failures are already logged and parked by the dispatcher
            let _ = self.dispatcher.dispatch(message.topic(), key, payload).await;

            if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                tracing::warn!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    error = %e,
                    "Failed to commit offset (message may be redelivered)"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;
    use rust_decimal::Decimal;
    use crate::domain::kitchen::KitchenQueueManager;
    use crate::domain::order::{NewOrderItem, OrderStatus};
    use crate::events::{serialize_envelope, EventEnvelope};
    use crate::messaging::InMemoryEventSink;
    use crate::store::{InMemoryKitchenQueueRepository, InMemoryOrderRepository};

    #[derive(Default)]
    struct RecordingDeadLetters {
        letters: Mutex<Vec<DeadLetter>>,
    }

    #[async_trait]
    impl DeadLetterSink for RecordingDeadLetters {
        async fn park(&self, letter: DeadLetter) {
            self.letters.lock().await.push(letter);
        }
    }

    struct Wiring {
        dispatcher: EventDispatcher,
        orders: Arc<OrderLifecycleManager>,
        kitchen: Arc<KitchenQueueManager>,
        sink: Arc<InMemoryEventSink>,
        dead_letters: Arc<RecordingDeadLetters>,
        metrics: Arc<Metrics>,
    }

    fn wiring() -> Wiring {
        let sink = Arc::new(InMemoryEventSink::new());
        let kitchen = Arc::new(KitchenQueueManager::new(
            Arc::new(InMemoryKitchenQueueRepository::new()),
            sink.clone(),
        ));
        let orders = Arc::new(OrderLifecycleManager::new(
            Arc::new(InMemoryOrderRepository::new()),
            kitchen.clone(),
            sink.clone(),
        ));
        let dead_letters = Arc::new(RecordingDeadLetters::default());
        let metrics = Arc::new(Metrics::new().unwrap());

        let dispatcher = EventDispatcher::new()
            .register(Arc::new(OrderEventHandler::new(orders.clone())))
            .register(Arc::new(KitchenEventHandler::new(kitchen.clone())))
            .with_dead_letters(dead_letters.clone())
            .with_metrics(metrics.clone());

        Wiring { dispatcher, orders, kitchen, sink, dead_letters, metrics }
    }

    #[test]
    fn test_topics_cover_registered_handlers() {
        let w = wiring();
        assert_eq!(
            w.dispatcher.topics(),
            vec![topics::KITCHEN_DISH_READY, topics::ORDERS_SENT_TO_KITCHEN]
        );
    }

    #[tokio::test]
    async fn test_redelivered_ticket_does_not_duplicate_kitchen_items() {
        let w = wiring();
        let order = w
            .orders
            .create_order(Uuid::new_v4(), Uuid::new_v4(), vec![NewOrderItem::new("Pho", 1, Decimal::TEN)], None)
            .await
            .unwrap();
        w.orders.send_to_kitchen(order.id).await.unwrap();

        // The ticket the order side published, delivered twice more by the bus
        let ticket = w.sink.published(topics::ORDERS_SENT_TO_KITCHEN).remove(0);
        for _ in 0..2 {
            w.dispatcher
                .dispatch(&ticket.topic, Some(&ticket.key), ticket.payload.as_bytes())
                .await
                .unwrap();
        }

        assert_eq!(w.kitchen.find_by_order(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dish_ready_delivery_advances_order() {
        let w = wiring();
        let order = w
            .orders
            .create_order(Uuid::new_v4(), Uuid::new_v4(), vec![NewOrderItem::new("Pho", 1, Decimal::TEN)], None)
            .await
            .unwrap();
        w.orders.send_to_kitchen(order.id).await.unwrap();

        let item = w.kitchen.find_by_order(order.id).await.unwrap().remove(0);
        w.kitchen.update_status(item.id, crate::domain::kitchen::KitchenStatus::InProgress).await.unwrap();
        w.kitchen.update_status(item.id, crate::domain::kitchen::KitchenStatus::Ready).await.unwrap();

        let ready = w.sink.published(topics::KITCHEN_DISH_READY).remove(0);
        w.dispatcher
            .dispatch(&ready.topic, Some(&ready.key), ready.payload.as_bytes())
            .await
            .unwrap();

        assert_eq!(w.orders.get_order(order.id).await.unwrap().status, OrderStatus::Ready);
    }

    #[tokio::test]
    async fn test_garbage_is_parked_and_counted() {
        let w = wiring();

        let err = w
            .dispatcher
            .dispatch(topics::KITCHEN_DISH_READY, Some("k"), b"not json")
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "decode");

        let letters = w.dead_letters.letters.lock().await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].payload, "not json");
        assert_eq!(letters[0].key.as_deref(), Some("k"));

        let gathered = w.metrics.registry().gather();
        let failed = gathered.iter().find(|m| m.name() == "events_failed_total").unwrap();
        assert_eq!(failed.metric[0].counter.value, Some(1.0));
    }

    #[tokio::test]
    async fn test_wrong_event_type_on_topic_is_rejected() {
        let w = wiring();
        let ticket = EventEnvelope::new(OrderSentToKitchenEvent {
            order_id: Uuid::new_v4(),
            table_id: Uuid::new_v4(),
            sent_at: Utc::now(),
            items: vec![],
        });
        let json = serialize_envelope(&ticket).unwrap();

        let err = w
            .dispatcher
            .dispatch(topics::KITCHEN_DISH_READY, None, json.as_bytes())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "decode");
    }

    #[tokio::test]
    async fn test_dish_ready_for_unknown_order_is_parked() {
        let w = wiring();
        let event = EventEnvelope::new(DishReadyEvent {
            kitchen_queue_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            order_item_id: Uuid::new_v4(),
            dish_name: "Ghost".to_string(),
            quantity: 1,
            ready_at: Utc::now(),
        });
        let json = serialize_envelope(&event).unwrap();

        let err = w
            .dispatcher
            .dispatch(topics::KITCHEN_DISH_READY, None, json.as_bytes())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "handler");
        assert_eq!(w.dead_letters.letters.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let w = wiring();
        let err = w.dispatcher.dispatch("menu.updated", None, b"{}").await.unwrap_err();
        assert_eq!(err.reason(), "unknown_topic");
    }
}
