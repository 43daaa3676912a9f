use uuid::Uuid;

use crate::domain::ErrorKind;
use crate::resilience::IsTransient;
use crate::store::RepositoryError;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("Cannot modify items of order in status: {0:?}")]
    ItemsLocked(OrderStatus),

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order is already closed")]
    AlreadyClosed,

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NotFound(_) | OrderError::ItemNotFound(_) => ErrorKind::NotFound,
            OrderError::ItemsLocked(_)
            | OrderError::InvalidStatusTransition { .. }
            | OrderError::AlreadyClosed => ErrorKind::Conflict,
            OrderError::EmptyItems | OrderError::InvalidQuantity(_) | OrderError::InvalidItem(_) => {
                ErrorKind::Validation
            }
            OrderError::Repository(e) => e.kind(),
        }
    }
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        matches!(self, OrderError::Repository(RepositoryError::VersionConflict { .. }))
    }
}
