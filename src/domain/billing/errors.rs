use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::ErrorKind;
use crate::resilience::OrderLookupError;
use crate::store::RepositoryError;
use super::value_objects::BillStatus;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Bill not found: {0}")]
    NotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Bill already exists for order: {0}")]
    AlreadyBilled(Uuid),

    #[error("Bill {bill_id} is not pending (status: {status:?})")]
    NotPending { bill_id: Uuid, status: BillStatus },

    #[error("Bill already paid: {0}")]
    AlreadyPaid(Uuid),

    #[error("Discount cannot be negative: {0}")]
    NegativeDiscount(Decimal),

    #[error("Order service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl BillingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::NotFound(_) | BillingError::OrderNotFound(_) => ErrorKind::NotFound,
            BillingError::AlreadyBilled(_)
            | BillingError::NotPending { .. }
            | BillingError::AlreadyPaid(_) => ErrorKind::Conflict,
            BillingError::NegativeDiscount(_) => ErrorKind::Validation,
            BillingError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            BillingError::Repository(e) => e.kind(),
        }
    }
}

impl From<OrderLookupError> for BillingError {
    fn from(error: OrderLookupError) -> Self {
        match error {
            OrderLookupError::NotFound(order_id) => BillingError::OrderNotFound(order_id),
            OrderLookupError::Unavailable(reason) => BillingError::ServiceUnavailable(reason),
        }
    }
}
