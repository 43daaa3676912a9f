use uuid::Uuid;

use crate::domain::ErrorKind;
use crate::store::RepositoryError;
use super::value_objects::KitchenStatus;

#[derive(Debug, thiserror::Error)]
pub enum KitchenError {
    #[error("Kitchen queue item not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid kitchen transition: {from:?} -> {to:?}")]
    InvalidTransition { from: KitchenStatus, to: KitchenStatus },

    #[error("Kitchen ticket for order {0} has no items")]
    EmptyTicket(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl KitchenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KitchenError::NotFound(_) => ErrorKind::NotFound,
            KitchenError::InvalidTransition { .. } => ErrorKind::Conflict,
            KitchenError::EmptyTicket(_) => ErrorKind::Validation,
            KitchenError::Repository(e) => e.kind(),
        }
    }
}
