use std::sync::Arc;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::events::{DishReadyEvent, EventEnvelope, OrderSentToKitchenEvent};
use crate::messaging::{publish_best_effort, EventSink};
use crate::store::KitchenQueueRepository;
use super::errors::KitchenError;
use super::value_objects::{KitchenQueueItem, KitchenStatus, OrderProgress};

/// What the order side needs from the kitchen
#[async_trait]
pub trait KitchenPort: Send + Sync {
    /// Create one queue item per ticket line. Repeating a ticket returns
    /// the items created the first time.
    async fn enqueue_order(
        &self,
        ticket: &OrderSentToKitchenEvent,
        correlation_id: Option<Uuid>,
    ) -> Result<Vec<KitchenQueueItem>, KitchenError>;
}

pub struct KitchenQueueManager {
    repository: Arc<dyn KitchenQueueRepository>,
    sink: Arc<dyn EventSink>,
}

impl KitchenQueueManager {
    pub fn new(repository: Arc<dyn KitchenQueueRepository>, sink: Arc<dyn EventSink>) -> Self {
        Self { repository, sink }
    }

    pub async fn get(&self, id: Uuid) -> Result<KitchenQueueItem, KitchenError> {
        self.repository
            .get(id)
            .await?
            .ok_or(KitchenError::NotFound(id))
    }

    /// Advance one item strictly forward; reaching READY announces the dish
    pub async fn update_status(
        &self,
        id: Uuid,
        target: KitchenStatus,
    ) -> Result<KitchenQueueItem, KitchenError> {
        let mut item = self.get(id).await?;
        let from = item.status;
        let expected_version = item.version;

        item.advance_to(target, Utc::now())?;
        item.version += 1;
        self.repository.update(&item, expected_version).await?;

        tracing::info!(
            kitchen_queue_id = %item.id,
            order_id = %item.order_id,
            from = ?from,
            to = ?target,
            "Kitchen item advanced"
        );

        if target == KitchenStatus::Ready {
            let event = DishReadyEvent {
                kitchen_queue_id: item.id,
                order_id: item.order_id,
                order_item_id: item.order_item_id,
                dish_name: item.dish_name.clone(),
                quantity: item.quantity,
                ready_at: item.completed_at.unwrap_or_else(Utc::now),
            };
            let envelope = EventEnvelope::with_correlation(event, item.correlation_id);
            publish_best_effort(self.sink.as_ref(), &envelope).await;
        }

        Ok(item)
    }

    pub async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<KitchenQueueItem>, KitchenError> {
        Ok(self.repository.find_by_order(order_id).await?)
    }

    /// PENDING and IN_PROGRESS items, oldest first
    pub async fn active_items(&self) -> Result<Vec<KitchenQueueItem>, KitchenError> {
        Ok(self.repository.find_active().await?)
    }

    pub async fn order_progress(&self, order_id: Uuid) -> Result<OrderProgress, KitchenError> {
        let items = self.repository.find_by_order(order_id).await?;
        Ok(OrderProgress::from_items(order_id, &items))
    }
}

#[async_trait]
impl KitchenPort for KitchenQueueManager {
    async fn enqueue_order(
        &self,
        ticket: &OrderSentToKitchenEvent,
        correlation_id: Option<Uuid>,
    ) -> Result<Vec<KitchenQueueItem>, KitchenError> {
        if ticket.items.is_empty() {
            return Err(KitchenError::EmptyTicket(ticket.order_id));
        }

        let items: Vec<KitchenQueueItem> = ticket
            .items
            .iter()
            .map(|line| {
                KitchenQueueItem::new(
                    ticket.order_id,
                    line.order_item_id,
                    line.dish_name.clone(),
                    line.quantity,
                    line.special_instructions.clone(),
                    correlation_id,
                )
            })
            .collect();

        // The repository claims the ticket per order, across every replica
        let stored = self.repository.insert_ticket(ticket.order_id, &items).await?;

        let created = stored.first().map(|item| item.id) == items.first().map(|item| item.id);
        if created {
            tracing::info!(
                order_id = %ticket.order_id,
                table_id = %ticket.table_id,
                items = stored.len(),
                "🍳 Order queued in kitchen"
            );
        } else {
            tracing::debug!(
                order_id = %ticket.order_id,
                items = stored.len(),
                "Ticket already queued, skipping"
            );
        }

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::events::{DishReadyEvent, KitchenTicketItem};
    use crate::messaging::InMemoryEventSink;
    use crate::store::InMemoryKitchenQueueRepository;

    fn setup() -> (KitchenQueueManager, Arc<InMemoryEventSink>) {
        let sink = Arc::new(InMemoryEventSink::new());
        let manager = KitchenQueueManager::new(Arc::new(InMemoryKitchenQueueRepository::new()), sink.clone());
        (manager, sink)
    }

    fn ticket(lines: usize) -> OrderSentToKitchenEvent {
        OrderSentToKitchenEvent {
            order_id: Uuid::new_v4(),
            table_id: Uuid::new_v4(),
            sent_at: Utc::now(),
            items: (0..lines)
                .map(|i| KitchenTicketItem {
                    order_item_id: Uuid::new_v4(),
                    dish_id: Uuid::new_v4(),
                    dish_name: format!("Dish {}", i),
                    quantity: 1,
                    special_instructions: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_per_order() {
        let (manager, _) = setup();
        let ticket = ticket(2);

        let first = manager.enqueue_order(&ticket, None).await.unwrap();
        let second = manager.enqueue_order(&ticket, None).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(
            first.iter().map(|i| i.id).collect::<Vec<_>>(),
            second.iter().map(|i| i.id).collect::<Vec<_>>()
        );
        assert_eq!(manager.find_by_order(ticket.order_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_from_two_managers_creates_one_set() {
        let repository = Arc::new(InMemoryKitchenQueueRepository::new());
        let sink = Arc::new(InMemoryEventSink::new());
        let first = Arc::new(KitchenQueueManager::new(repository.clone(), sink.clone()));
        let second = Arc::new(KitchenQueueManager::new(repository, sink));
        let ticket = ticket(3);

        let (a, b) = tokio::join!(
            first.enqueue_order(&ticket, None),
            second.enqueue_order(&ticket, None)
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(first.find_by_order(ticket.order_id).await.unwrap().len(), 3);
        assert_eq!(second.active_items().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_ticket_rejected() {
        let (manager, _) = setup();
        let err = manager.enqueue_order(&ticket(0), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_ready_publishes_dish_ready_with_ticket_correlation() {
        let (manager, sink) = setup();
        let correlation = Uuid::new_v4();
        let items = manager.enqueue_order(&ticket(1), Some(correlation)).await.unwrap();
        let id = items[0].id;

        manager.update_status(id, KitchenStatus::InProgress).await.unwrap();
        assert!(sink.messages().is_empty());

        let item = manager.update_status(id, KitchenStatus::Ready).await.unwrap();
        assert!(item.completed_at.is_some());
        assert_eq!(item.version, 2);

        let published = sink.decode::<DishReadyEvent>().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].correlation_id(), correlation);
        assert_eq!(published[0].payload().kitchen_queue_id, id);
        assert_eq!(published[0].payload().order_item_id, items[0].order_item_id);
    }

    #[tokio::test]
    async fn test_skipping_a_step_is_rejected() {
        let (manager, sink) = setup();
        let items = manager.enqueue_order(&ticket(1), None).await.unwrap();

        let err = manager.update_status(items[0].id, KitchenStatus::Ready).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(manager.get(items[0].id).await.unwrap().status, KitchenStatus::Pending);
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_status_change() {
        let (manager, sink) = setup();
        let items = manager.enqueue_order(&ticket(1), None).await.unwrap();
        let id = items[0].id;
        manager.update_status(id, KitchenStatus::InProgress).await.unwrap();

        sink.set_failing(true);
        manager.update_status(id, KitchenStatus::Ready).await.unwrap();

        assert_eq!(manager.get(id).await.unwrap().status, KitchenStatus::Ready);
    }

    #[tokio::test]
    async fn test_progress_and_active_items() {
        let (manager, _) = setup();
        let ticket = ticket(2);
        let items = manager.enqueue_order(&ticket, None).await.unwrap();

        manager.update_status(items[0].id, KitchenStatus::InProgress).await.unwrap();
        manager.update_status(items[0].id, KitchenStatus::Ready).await.unwrap();

        let progress = manager.order_progress(ticket.order_id).await.unwrap();
        assert_eq!((progress.pending, progress.ready), (1, 1));
        assert!(!progress.all_ready());

        let active = manager.active_items().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, items[1].id);
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_found() {
        let (manager, _) = setup();
        let err = manager.update_status(Uuid::new_v4(), KitchenStatus::InProgress).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
