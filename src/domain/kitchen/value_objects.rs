use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::errors::KitchenError;

// ============================================================================
// Kitchen Status
// ============================================================================
//
//   PENDING → IN_PROGRESS → READY → SERVED
//
// Strictly one step forward; no skipping, no going back.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KitchenStatus {
    Pending,
    InProgress,
    Ready,
    Served,
}

impl KitchenStatus {
    pub fn next(&self) -> Option<KitchenStatus> {
        match self {
            KitchenStatus::Pending => Some(KitchenStatus::InProgress),
            KitchenStatus::InProgress => Some(KitchenStatus::Ready),
            KitchenStatus::Ready => Some(KitchenStatus::Served),
            KitchenStatus::Served => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, KitchenStatus::Pending | KitchenStatus::InProgress)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, KitchenStatus::Ready)
    }
}

// ============================================================================
// Kitchen Queue Item
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitchenQueueItem {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Back-reference into the order, not ownership
    pub order_item_id: Uuid,
    pub dish_name: String,
    pub quantity: i32,
    pub status: KitchenStatus,
    pub special_request: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Correlation id of the ticket this item came from
    pub correlation_id: Option<Uuid>,
    pub version: i64,
}

impl KitchenQueueItem {
    pub fn new(
        order_id: Uuid,
        order_item_id: Uuid,
        dish_name: String,
        quantity: i32,
        special_request: Option<String>,
        correlation_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            order_item_id,
            dish_name,
            quantity,
            status: KitchenStatus::Pending,
            special_request,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            correlation_id,
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    /// Move one step forward. Timestamps are set the first time only.
    pub fn advance_to(&mut self, target: KitchenStatus, now: DateTime<Utc>) -> Result<(), KitchenError> {
        if self.status.next() != Some(target) {
            return Err(KitchenError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        match target {
            KitchenStatus::InProgress => {
                self.started_at.get_or_insert(now);
            }
            KitchenStatus::Ready => {
                self.completed_at.get_or_insert(now);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Per-order aggregation over the kitchen items
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProgress {
    pub order_id: Uuid,
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub ready: usize,
    pub served: usize,
}

impl OrderProgress {
    pub fn from_items(order_id: Uuid, items: &[KitchenQueueItem]) -> Self {
        let mut progress = OrderProgress {
            order_id,
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.status {
                KitchenStatus::Pending => progress.pending += 1,
                KitchenStatus::InProgress => progress.in_progress += 1,
                KitchenStatus::Ready => progress.ready += 1,
                KitchenStatus::Served => progress.served += 1,
            }
        }
        progress
    }

    /// Every dish is ready or already served
    pub fn all_ready(&self) -> bool {
        self.total > 0 && self.ready + self.served == self.total
    }
}
