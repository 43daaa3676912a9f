use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::billing::Bill;
use crate::domain::kitchen::KitchenQueueItem;
use crate::domain::order::Order;
use super::{BillRepository, KitchenQueueRepository, OrderRepository, RepositoryError};

// ============================================================================
// In-Memory Repositories
// ============================================================================
//
// The version check and the write happen under one write lock, which gives
// the same compare-and-set guarantee as a conditional database write.
//
// ============================================================================

fn check_version(
    aggregate: &'static str,
    id: Uuid,
    stored: i64,
    expected: i64,
) -> Result<(), RepositoryError> {
    if stored != expected {
        return Err(RepositoryError::VersionConflict {
            aggregate,
            id,
            expected,
            actual: stored,
        });
    }
    Ok(())
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(RepositoryError::Duplicate { aggregate: "Order", key: order.id });
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update(&self, order: &Order, expected_version: i64) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get(&order.id)
            .ok_or(RepositoryError::NotFound { aggregate: "Order", id: order.id })?;
        check_version("Order", order.id, stored.version, expected_version)?;
        orders.insert(order.id, order.clone());
        Ok(())
    }
}

#[derive(Default)]
struct KitchenTables {
    items: HashMap<Uuid, KitchenQueueItem>,
    // Insertion order per order, so tickets read back in the order they were written
    by_order: HashMap<Uuid, Vec<Uuid>>,
}

#[derive(Default)]
pub struct InMemoryKitchenQueueRepository {
    tables: RwLock<KitchenTables>,
}

impl InMemoryKitchenQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KitchenQueueRepository for InMemoryKitchenQueueRepository {
    async fn insert_ticket(
        &self,
        order_id: Uuid,
        items: &[KitchenQueueItem],
    ) -> Result<Vec<KitchenQueueItem>, RepositoryError> {
        let mut tables = self.tables.write().await;

        if let Some(ids) = tables.by_order.get(&order_id) {
            return Ok(ids.iter().filter_map(|id| tables.items.get(id).cloned()).collect());
        }

        tables.by_order.insert(order_id, items.iter().map(|item| item.id).collect());
        for item in items {
            tables.items.insert(item.id, item.clone());
        }
        Ok(items.to_vec())
    }

    async fn get(&self, id: Uuid) -> Result<Option<KitchenQueueItem>, RepositoryError> {
        Ok(self.tables.read().await.items.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<KitchenQueueItem>, RepositoryError> {
        let tables = self.tables.read().await;
        let items = tables
            .by_order
            .get(&order_id)
            .map(|ids| ids.iter().filter_map(|id| tables.items.get(id).cloned()).collect())
            .unwrap_or_default();
        Ok(items)
    }

    async fn find_active(&self) -> Result<Vec<KitchenQueueItem>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut active: Vec<KitchenQueueItem> = tables
            .items
            .values()
            .filter(|item| item.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|item| item.created_at);
        Ok(active)
    }

    async fn update(&self, item: &KitchenQueueItem, expected_version: i64) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let stored = tables.items.get(&item.id).ok_or(RepositoryError::NotFound {
            aggregate: "KitchenQueueItem",
            id: item.id,
        })?;
        check_version("KitchenQueueItem", item.id, stored.version, expected_version)?;
        tables.items.insert(item.id, item.clone());
        Ok(())
    }
}

#[derive(Default)]
struct BillTables {
    bills: HashMap<Uuid, Bill>,
    by_order: HashMap<Uuid, Uuid>,
}

#[derive(Default)]
pub struct InMemoryBillRepository {
    tables: RwLock<BillTables>,
}

impl InMemoryBillRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.tables.read().await.bills.len()
    }
}

#[async_trait]
impl BillRepository for InMemoryBillRepository {
    async fn insert(&self, bill: &Bill) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.by_order.contains_key(&bill.order_id) {
            return Err(RepositoryError::Duplicate { aggregate: "Bill", key: bill.order_id });
        }
        tables.by_order.insert(bill.order_id, bill.id);
        tables.bills.insert(bill.id, bill.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Bill>, RepositoryError> {
        Ok(self.tables.read().await.bills.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: Uuid) -> Result<Option<Bill>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_order
            .get(&order_id)
            .and_then(|bill_id| tables.bills.get(bill_id))
            .cloned())
    }

    async fn update(&self, bill: &Bill, expected_version: i64) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .bills
            .get(&bill.id)
            .ok_or(RepositoryError::NotFound { aggregate: "Bill", id: bill.id })?;
        check_version("Bill", bill.id, stored.version, expected_version)?;
        tables.bills.insert(bill.id, bill.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::BillingPolicy;
    use crate::domain::ErrorKind;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_stale_order_update_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        let order = Order::new(Uuid::new_v4(), Uuid::new_v4(), None);
        repo.insert(&order).await.unwrap();

        let mut first = repo.get(order.id).await.unwrap().unwrap();
        let mut second = first.clone();

        first.version += 1;
        repo.update(&first, 0).await.unwrap();

        second.version += 1;
        let err = repo.update(&second, 0).await.unwrap_err();
        assert!(matches!(err, RepositoryError::VersionConflict { expected: 0, actual: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_update_unknown_order_is_not_found() {
        let repo = InMemoryOrderRepository::new();
        let order = Order::new(Uuid::new_v4(), Uuid::new_v4(), None);

        let err = repo.update(&order, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_one_bill_per_order() {
        let repo = InMemoryBillRepository::new();
        let order_id = Uuid::new_v4();
        let policy = BillingPolicy::default();

        repo.insert(&Bill::generate(order_id, Decimal::TEN, &policy)).await.unwrap();
        let err = repo
            .insert(&Bill::generate(order_id, Decimal::TEN, &policy))
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Duplicate { aggregate: "Bill", .. }));
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn test_kitchen_items_read_back_in_ticket_order() {
        let repo = InMemoryKitchenQueueRepository::new();
        let order_id = Uuid::new_v4();
        let items: Vec<KitchenQueueItem> = (0..3)
            .map(|i| KitchenQueueItem::new(order_id, Uuid::new_v4(), format!("Dish {}", i), 1, None, None))
            .collect();

        repo.insert_ticket(order_id, &items).await.unwrap();

        let found = repo.find_by_order(order_id).await.unwrap();
        let ids: Vec<Uuid> = found.iter().map(|item| item.id).collect();
        let expected: Vec<Uuid> = items.iter().map(|item| item.id).collect();
        assert_eq!(ids, expected);
        assert_eq!(repo.find_active().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_second_ticket_for_order_returns_first() {
        let repo = InMemoryKitchenQueueRepository::new();
        let order_id = Uuid::new_v4();
        let ticket = |dish: &str| vec![KitchenQueueItem::new(order_id, Uuid::new_v4(), dish.to_string(), 1, None, None)];

        let first = repo.insert_ticket(order_id, &ticket("Soup")).await.unwrap();
        let second = repo.insert_ticket(order_id, &ticket("Soup")).await.unwrap();

        assert_eq!(second, first);
        assert_eq!(repo.find_by_order(order_id).await.unwrap().len(), 1);
        assert_eq!(repo.find_active().await.unwrap().len(), 1);
    }
}
