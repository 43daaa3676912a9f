use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::events::{KitchenTicketItem, OrderCreatedEvent, OrderCreatedItem, OrderSentToKitchenEvent};
use super::errors::OrderError;

// ============================================================================
// Order Status
// ============================================================================
//
//   CREATED → IN_KITCHEN → PREPARING → READY → DELIVERED → CLOSED
//
// Two documented extra edges:
// - any non-terminal status → CLOSED (closing does not require READY)
// - IN_KITCHEN → READY, taken only by the first DishReady delivery
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    InKitchen,
    Preparing,
    Ready,
    Delivered,
    Closed,
}

impl OrderStatus {
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Created => Some(OrderStatus::InKitchen),
            OrderStatus::InKitchen => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => Some(OrderStatus::Closed),
            OrderStatus::Closed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Closed)
    }

    /// Edges reachable through an explicit status update
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == OrderStatus::Closed || self.next() == Some(target)
    }
}

// ============================================================================
// Order Items
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub dish_id: Uuid,
    pub dish_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub special_request: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Item as entered by the waiter, before it belongs to an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub dish_id: Uuid,
    pub dish_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub special_request: Option<String>,
}

impl NewOrderItem {
    pub fn new(dish_name: impl Into<String>, quantity: i32, price: Decimal) -> Self {
        Self {
            dish_id: Uuid::new_v4(),
            dish_name: dish_name.into(),
            quantity,
            price,
            special_request: None,
        }
    }

    pub fn with_special_request(mut self, request: impl Into<String>) -> Self {
        self.special_request = Some(request.into());
        self
    }

    fn validate(&self) -> Result<(), OrderError> {
        if self.quantity <= 0 {
            return Err(OrderError::InvalidQuantity(self.quantity));
        }
        if self.price < Decimal::ZERO {
            return Err(OrderError::InvalidItem(format!("negative price {}", self.price)));
        }
        if self.dish_name.trim().is_empty() {
            return Err(OrderError::InvalidItem("dish name is empty".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Order Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub table_id: Uuid,
    pub waiter_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub special_requests: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every persisted mutation
    pub version: i64,
}

impl Order {
    pub fn new(table_id: Uuid, waiter_id: Uuid, special_requests: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            table_id,
            waiter_id,
            status: OrderStatus::Created,
            total_amount: Decimal::ZERO,
            special_requests,
            items: Vec::new(),
            created_at: Utc::now(),
            closed_at: None,
            version: 0,
        }
    }

    fn ensure_items_editable(&self) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Created => Ok(()),
            status => Err(OrderError::ItemsLocked(status)),
        }
    }

    fn recompute_total(&mut self) {
        self.total_amount = self.items.iter().map(OrderItem::line_total).sum();
    }

    pub fn add_item(&mut self, item: NewOrderItem) -> Result<OrderItem, OrderError> {
        self.ensure_items_editable()?;
        item.validate()?;

        let item = OrderItem {
            id: Uuid::new_v4(),
            order_id: self.id,
            dish_id: item.dish_id,
            dish_name: item.dish_name,
            quantity: item.quantity,
            price: item.price,
            special_request: item.special_request,
        };
        self.items.push(item.clone());
        self.recompute_total();

        Ok(item)
    }

    pub fn remove_item(&mut self, item_id: Uuid) -> Result<OrderItem, OrderError> {
        self.ensure_items_editable()?;

        let position = self
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or(OrderError::ItemNotFound(item_id))?;
        let removed = self.items.remove(position);
        self.recompute_total();

        Ok(removed)
    }

    /// CREATED → IN_KITCHEN, producing the kitchen ticket
    pub fn send_to_kitchen(&mut self, sent_at: DateTime<Utc>) -> Result<OrderSentToKitchenEvent, OrderError> {
        if self.status != OrderStatus::Created {
            return Err(OrderError::InvalidStatusTransition {
                from: self.status,
                to: OrderStatus::InKitchen,
            });
        }
        if self.items.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        self.status = OrderStatus::InKitchen;

        Ok(OrderSentToKitchenEvent {
            order_id: self.id,
            table_id: self.table_id,
            sent_at,
            items: self
                .items
                .iter()
                .map(|item| KitchenTicketItem {
                    order_item_id: item.id,
                    dish_id: item.dish_id,
                    dish_name: item.dish_name.clone(),
                    quantity: item.quantity,
                    special_instructions: item.special_request.clone(),
                })
                .collect(),
        })
    }

    pub fn transition_to(&mut self, target: OrderStatus) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::AlreadyClosed);
        }
        if !self.status.can_transition_to(target) {
            return Err(OrderError::InvalidStatusTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        if target == OrderStatus::Closed {
            self.closed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Apply a dish-ready notification. Returns false when it does not apply
    /// (already advanced, or not sent to kitchen yet).
    pub fn apply_dish_ready(&mut self) -> bool {
        if self.status != OrderStatus::InKitchen {
            return false;
        }
        self.status = OrderStatus::Ready;
        true
    }

    pub fn created_event(&self) -> OrderCreatedEvent {
        OrderCreatedEvent {
            order_id: self.id,
            table_id: self.table_id,
            waiter_id: self.waiter_id,
            created_at: self.created_at,
            items: self
                .items
                .iter()
                .map(|item| OrderCreatedItem {
                    item_id: item.id,
                    dish_id: item.dish_id,
                    dish_name: item.dish_name.clone(),
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            total_amount: self.total_amount,
        }
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            order_id: self.id,
            table_id: self.table_id,
            status: self.status,
            total_amount: self.total_amount,
            item_count: self.items.len(),
        }
    }
}

/// Read model served to other services (billing reads this)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub order_id: Uuid,
    pub table_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub item_count: usize,
}

// ============================================================================
// Unit Tests
// ============================================================================
