use std::sync::Arc;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::kitchen::KitchenPort;
use crate::events::{DishReadyEvent, EventEnvelope};
use crate::messaging::{publish_best_effort, EventSink};
use crate::metrics::Metrics;
use crate::resilience::{retry_on_transient, RetryConfig};
use crate::store::OrderRepository;
use super::errors::OrderError;
use super::value_objects::{NewOrderItem, Order, OrderItem, OrderStatus};

// ============================================================================
// Order Lifecycle Manager
// ============================================================================
//
// Every mutation is load → apply → update(expected_version). HTTP-driven
// and event-driven mutations race on the same order; the loser of a race
// sees a VersionConflict. Event-driven mutations retry it, request-driven
// ones surface it to the caller as Conflict.
//
// ============================================================================

pub struct OrderLifecycleManager {
    repository: Arc<dyn OrderRepository>,
    kitchen: Arc<dyn KitchenPort>,
    sink: Arc<dyn EventSink>,
    conflict_retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

const DISH_READY_OPERATION: &str = "order_dish_ready";

impl OrderLifecycleManager {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        kitchen: Arc<dyn KitchenPort>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            repository,
            kitchen,
            sink,
            conflict_retry: RetryConfig::version_conflict(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_conflict_retry(mut self, config: RetryConfig) -> Self {
        self.conflict_retry = config;
        self
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.repository
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    async fn persist(&self, order: &mut Order, expected_version: i64) -> Result<(), OrderError> {
        order.version = expected_version + 1;
        self.repository.update(order, expected_version).await?;
        Ok(())
    }

    pub async fn create_order(
        &self,
        table_id: Uuid,
        waiter_id: Uuid,
        items: Vec<NewOrderItem>,
        special_requests: Option<String>,
    ) -> Result<Order, OrderError> {
        let mut order = Order::new(table_id, waiter_id, special_requests);
        for item in items {
            order.add_item(item)?;
        }

        self.repository.insert(&order).await?;

        tracing::info!(
            order_id = %order.id,
            table_id = %table_id,
            items = order.items.len(),
            total = %order.total_amount,
            "📝 Order created"
        );

        publish_best_effort(self.sink.as_ref(), &EventEnvelope::new(order.created_event())).await;
        Ok(order)
    }

    pub async fn add_item(&self, order_id: Uuid, item: NewOrderItem) -> Result<OrderItem, OrderError> {
        let mut order = self.get_order(order_id).await?;
        let expected_version = order.version;

        let added = order.add_item(item)?;
        self.persist(&mut order, expected_version).await?;

        tracing::debug!(order_id = %order_id, item_id = %added.id, "Item added");
        Ok(added)
    }

    pub async fn remove_item(&self, order_id: Uuid, item_id: Uuid) -> Result<OrderItem, OrderError> {
        let mut order = self.get_order(order_id).await?;
        let expected_version = order.version;

        let removed = order.remove_item(item_id)?;
        self.persist(&mut order, expected_version).await?;

        tracing::debug!(order_id = %order_id, item_id = %item_id, "Item removed");
        Ok(removed)
    }

    /// CREATED → IN_KITCHEN: queue the dishes and announce the ticket
    pub async fn send_to_kitchen(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let mut order = self.get_order(order_id).await?;
        let expected_version = order.version;

        let ticket = order.send_to_kitchen(Utc::now())?;
        self.persist(&mut order, expected_version).await?;

        tracing::info!(order_id = %order_id, items = ticket.items.len(), "🍽️ Order sent to kitchen");

        let envelope = EventEnvelope::new(ticket);

        // The order is committed; the kitchen also picks the ticket up from the bus
        if let Err(e) = self
            .kitchen
            .enqueue_order(envelope.payload(), Some(envelope.correlation_id()))
            .await
        {
            tracing::error!(
                order_id = %order_id,
                error = %e,
                "Kitchen enqueue failed, relying on the sent-to-kitchen event"
            );
        }

        publish_best_effort(self.sink.as_ref(), &envelope).await;
        Ok(order)
    }

    /// Explicit status change along the forward edges, or to CLOSED
    pub async fn update_status(&self, order_id: Uuid, target: OrderStatus) -> Result<Order, OrderError> {
        if target == OrderStatus::InKitchen {
            return self.send_to_kitchen(order_id).await;
        }

        let mut order = self.get_order(order_id).await?;
        let expected_version = order.version;
        let from = order.status;

        order.transition_to(target)?;
        self.persist(&mut order, expected_version).await?;

        tracing::info!(order_id = %order_id, from = ?from, to = ?target, "Order status changed");
        Ok(order)
    }

    pub async fn mark_preparing(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.update_status(order_id, OrderStatus::Preparing).await
    }

    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.update_status(order_id, OrderStatus::Delivered).await
    }

    /// Legal from any non-terminal status
    pub async fn close_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.update_status(order_id, OrderStatus::Closed).await
    }

    /// Consume DishReady. The first delivery while IN_KITCHEN moves the
    /// order to READY; anything else is a no-op. Returns whether it applied.
    pub async fn handle_dish_ready(&self, envelope: &EventEnvelope<DishReadyEvent>) -> Result<bool, OrderError> {
        let order_id = envelope.payload().order_id;

        let mut attempts = 0;
        let result = retry_on_transient(&self.conflict_retry, |attempt| {
            attempts = attempt;
            if attempt > 1 {
                if let Some(ref metrics) = self.metrics {
                    metrics.record_retry_attempt(DISH_READY_OPERATION, attempt);
                }
            }
            self.apply_dish_ready(order_id)
        })
        .await;

        if attempts > 1 {
            if let Some(ref metrics) = self.metrics {
                metrics.record_retry_outcome(DISH_READY_OPERATION, result.is_ok());
            }
        }
        let applied = result?;

        if applied {
            tracing::info!(
                order_id = %order_id,
                kitchen_queue_id = %envelope.payload().kitchen_queue_id,
                correlation_id = %envelope.correlation_id(),
                "✅ Order ready"
            );
        } else {
            tracing::debug!(
                order_id = %order_id,
                event_id = %envelope.event_id(),
                "DishReady did not apply, order not in kitchen"
            );
        }
        Ok(applied)
    }

    async fn apply_dish_ready(&self, order_id: Uuid) -> Result<bool, OrderError> {
        let mut order = self.get_order(order_id).await?;
        let expected_version = order.version;

        if !order.apply_dish_ready() {
            return Ok(false);
        }
        self.persist(&mut order, expected_version).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use crate::domain::kitchen::{KitchenError, KitchenQueueItem, KitchenQueueManager};
    use crate::domain::ErrorKind;
    use crate::events::{OrderCreatedEvent, OrderSentToKitchenEvent};
    use crate::messaging::InMemoryEventSink;
    use crate::store::{InMemoryKitchenQueueRepository, InMemoryOrderRepository, RepositoryError};

    struct Setup {
        manager: OrderLifecycleManager,
        kitchen: Arc<KitchenQueueManager>,
        sink: Arc<InMemoryEventSink>,
    }

    fn setup_with(repository: Arc<dyn OrderRepository>) -> Setup {
        let sink = Arc::new(InMemoryEventSink::new());
        let kitchen = Arc::new(KitchenQueueManager::new(
            Arc::new(InMemoryKitchenQueueRepository::new()),
            sink.clone(),
        ));
        let manager = OrderLifecycleManager::new(repository, kitchen.clone(), sink.clone());
        Setup { manager, kitchen, sink }
    }

    fn setup() -> Setup {
        setup_with(Arc::new(InMemoryOrderRepository::new()))
    }

    fn items(count: usize) -> Vec<NewOrderItem> {
        (0..count)
            .map(|i| NewOrderItem::new(format!("Dish {}", i), 1, Decimal::new(900, 2)))
            .collect()
    }

    fn dish_ready(order_id: Uuid) -> EventEnvelope<DishReadyEvent> {
        EventEnvelope::new(DishReadyEvent {
            kitchen_queue_id: Uuid::new_v4(),
            order_id,
            order_item_id: Uuid::new_v4(),
            dish_name: "Dish 0".to_string(),
            quantity: 1,
            ready_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_create_order_publishes_created() {
        let s = setup();
        let order = s
            .manager
            .create_order(Uuid::new_v4(), Uuid::new_v4(), items(2), Some("window seat".to_string()))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.total_amount, Decimal::new(1800, 2));

        let events = s.sink.decode::<OrderCreatedEvent>().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload().items.len(), 2);
    }

    #[tokio::test]
    async fn test_send_to_kitchen_queues_and_publishes() {
        let s = setup();
        let order = s.manager.create_order(Uuid::new_v4(), Uuid::new_v4(), items(2), None).await.unwrap();

        let sent = s.manager.send_to_kitchen(order.id).await.unwrap();
        assert_eq!(sent.status, OrderStatus::InKitchen);
        assert_eq!(sent.version, 1);

        let queued = s.kitchen.find_by_order(order.id).await.unwrap();
        assert_eq!(queued.len(), 2);

        let tickets = s.sink.decode::<OrderSentToKitchenEvent>().unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(queued[0].correlation_id, Some(tickets[0].correlation_id()));
    }

    #[tokio::test]
    async fn test_send_twice_or_empty_fails() {
        let s = setup();
        let empty = s.manager.create_order(Uuid::new_v4(), Uuid::new_v4(), vec![], None).await.unwrap();
        let err = s.manager.send_to_kitchen(empty.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let order = s.manager.create_order(Uuid::new_v4(), Uuid::new_v4(), items(1), None).await.unwrap();
        s.manager.send_to_kitchen(order.id).await.unwrap();
        let err = s.manager.send_to_kitchen(order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_items_editable_only_while_created() {
        let s = setup();
        let order = s.manager.create_order(Uuid::new_v4(), Uuid::new_v4(), items(1), None).await.unwrap();

        let added = s.manager.add_item(order.id, NewOrderItem::new("Tea", 2, Decimal::TWO)).await.unwrap();
        s.manager.remove_item(order.id, added.id).await.unwrap();
        s.manager.send_to_kitchen(order.id).await.unwrap();

        let err = s.manager.add_item(order.id, NewOrderItem::new("Tea", 1, Decimal::TWO)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_dish_ready_replay_is_noop() {
        let s = setup();
        let order = s.manager.create_order(Uuid::new_v4(), Uuid::new_v4(), items(1), None).await.unwrap();
        s.manager.send_to_kitchen(order.id).await.unwrap();

        let event = dish_ready(order.id);
        assert!(s.manager.handle_dish_ready(&event).await.unwrap());
        assert!(!s.manager.handle_dish_ready(&event).await.unwrap());

        let order = s.manager.get_order(order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Ready);
        assert_eq!(order.version, 2);
    }

    #[tokio::test]
    async fn test_dish_ready_before_kitchen_is_noop() {
        let s = setup();
        let order = s.manager.create_order(Uuid::new_v4(), Uuid::new_v4(), items(1), None).await.unwrap();

        assert!(!s.manager.handle_dish_ready(&dish_ready(order.id)).await.unwrap());
        assert_eq!(s.manager.get_order(order.id).await.unwrap().status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn test_full_forward_walk_and_strict_edges() {
        let s = setup();
        let order = s.manager.create_order(Uuid::new_v4(), Uuid::new_v4(), items(1), None).await.unwrap();

        let err = s.manager.update_status(order.id, OrderStatus::Ready).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        s.manager.update_status(order.id, OrderStatus::InKitchen).await.unwrap();
        s.manager.mark_preparing(order.id).await.unwrap();
        s.manager.update_status(order.id, OrderStatus::Ready).await.unwrap();
        s.manager.mark_delivered(order.id).await.unwrap();
        let closed = s.manager.close_order(order.id).await.unwrap();

        assert_eq!(closed.status, OrderStatus::Closed);
        assert!(closed.closed_at.is_some());
        assert!(matches!(s.manager.close_order(order.id).await, Err(OrderError::AlreadyClosed)));
    }

    #[tokio::test]
    async fn test_close_from_created() {
        let s = setup();
        let order = s.manager.create_order(Uuid::new_v4(), Uuid::new_v4(), items(1), None).await.unwrap();
        assert_eq!(s.manager.close_order(order.id).await.unwrap().status, OrderStatus::Closed);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let s = setup();
        let err = s.manager.handle_dish_ready(&dish_ready(Uuid::new_v4())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    /// Loses the first update race, then behaves normally
    struct ConflictOnce {
        inner: InMemoryOrderRepository,
        conflicted: AtomicBool,
    }

    #[async_trait]
    impl OrderRepository for ConflictOnce {
        async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
            self.inner.insert(order).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
            self.inner.get(id).await
        }

        async fn update(&self, order: &Order, expected_version: i64) -> Result<(), RepositoryError> {
            if !self.conflicted.swap(true, Ordering::SeqCst) && order.status == OrderStatus::Ready {
                return Err(RepositoryError::VersionConflict {
                    aggregate: "Order",
                    id: order.id,
                    expected: expected_version,
                    actual: expected_version + 1,
                });
            }
            self.inner.update(order, expected_version).await
        }
    }

    #[tokio::test]
    async fn test_dish_ready_retries_version_conflict() {
        let repository = Arc::new(ConflictOnce {
            inner: InMemoryOrderRepository::new(),
            conflicted: AtomicBool::new(true),
        });
        let s = setup_with(repository.clone());
        let order = s.manager.create_order(Uuid::new_v4(), Uuid::new_v4(), items(1), None).await.unwrap();
        s.manager.send_to_kitchen(order.id).await.unwrap();

        repository.conflicted.store(false, Ordering::SeqCst);
        assert!(s.manager.handle_dish_ready(&dish_ready(order.id)).await.unwrap());
        assert_eq!(s.manager.get_order(order.id).await.unwrap().status, OrderStatus::Ready);
    }

    #[tokio::test]
    async fn test_dish_ready_retry_outcome_is_recorded() {
        let repository = Arc::new(ConflictOnce {
            inner: InMemoryOrderRepository::new(),
            conflicted: AtomicBool::new(true),
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let sink = Arc::new(InMemoryEventSink::new());
        let kitchen = Arc::new(KitchenQueueManager::new(
            Arc::new(InMemoryKitchenQueueRepository::new()),
            sink.clone(),
        ));
        let manager = OrderLifecycleManager::new(repository.clone(), kitchen, sink)
            .with_metrics(metrics.clone());

        let order = manager.create_order(Uuid::new_v4(), Uuid::new_v4(), items(1), None).await.unwrap();
        manager.send_to_kitchen(order.id).await.unwrap();
        repository.conflicted.store(false, Ordering::SeqCst);
        manager.handle_dish_ready(&dish_ready(order.id)).await.unwrap();

        let gathered = metrics.registry().gather();
        let succeeded = gathered.iter().find(|m| m.name() == "retry_success_total").unwrap();
        assert_eq!(succeeded.metric.len(), 1);
        assert_eq!(succeeded.metric[0].counter.value, Some(1.0));
        assert!(gathered.iter().all(|m| m.name() != "retry_failure_total" || m.metric.is_empty()));
    }

    struct BrokenKitchen;

    #[async_trait]
    impl KitchenPort for BrokenKitchen {
        async fn enqueue_order(
            &self,
            ticket: &OrderSentToKitchenEvent,
            _correlation_id: Option<Uuid>,
        ) -> Result<Vec<KitchenQueueItem>, KitchenError> {
            Err(KitchenError::Repository(RepositoryError::Backend(anyhow::anyhow!(
                "kitchen store down for {}",
                ticket.order_id
            ))))
        }
    }

    #[tokio::test]
    async fn test_kitchen_failure_does_not_undo_send() {
        let sink = Arc::new(InMemoryEventSink::new());
        let manager = OrderLifecycleManager::new(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(BrokenKitchen),
            sink.clone(),
        );
        let order = manager.create_order(Uuid::new_v4(), Uuid::new_v4(), items(1), None).await.unwrap();

        let sent = manager.send_to_kitchen(order.id).await.unwrap();
        assert_eq!(sent.status, OrderStatus::InKitchen);
        assert_eq!(sink.decode::<OrderSentToKitchenEvent>().unwrap().len(), 1);
    }
}
