use std::sync::Arc;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::events::EventEnvelope;
use crate::messaging::{publish_best_effort, EventSink};
use crate::resilience::ResilientOrderClient;
use crate::store::{BillRepository, RepositoryError};
use super::errors::BillingError;
use super::value_objects::{Bill, BillingPolicy, PaymentMethod};

// ============================================================================
// Billing Generator
// ============================================================================
//
// generate_bill is idempotent by rejection: a second call for the same
// order fails with AlreadyBilled. The order lookup happens before anything
// is written, so a lookup failure leaves no bill behind.
//
// ============================================================================

pub struct BillingGenerator {
    repository: Arc<dyn BillRepository>,
    orders: Arc<ResilientOrderClient>,
    sink: Arc<dyn EventSink>,
    policy: BillingPolicy,
}

impl BillingGenerator {
    pub fn new(
        repository: Arc<dyn BillRepository>,
        orders: Arc<ResilientOrderClient>,
        sink: Arc<dyn EventSink>,
        policy: BillingPolicy,
    ) -> Self {
        Self {
            repository,
            orders,
            sink,
            policy,
        }
    }

    pub async fn generate_bill(&self, order_id: Uuid) -> Result<Bill, BillingError> {
        if self.repository.find_by_order(order_id).await?.is_some() {
            return Err(BillingError::AlreadyBilled(order_id));
        }

        let snapshot = self.orders.get_order(order_id).await?;
        let bill = Bill::generate(order_id, snapshot.total_amount, &self.policy);

        match self.repository.insert(&bill).await {
            Ok(()) => {}
            // Lost a race with a concurrent generate for the same order
            Err(RepositoryError::Duplicate { .. }) => {
                return Err(BillingError::AlreadyBilled(order_id));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            bill_id = %bill.id,
            order_id = %order_id,
            final_amount = %bill.final_amount,
            "🧾 Bill generated"
        );

        let envelope = EventEnvelope::new(bill.generated_event());
        publish_best_effort(self.sink.as_ref(), &envelope).await;

        Ok(bill)
    }

    pub async fn apply_discount(
        &self,
        bill_id: Uuid,
        amount: Decimal,
        notes: Option<String>,
    ) -> Result<Bill, BillingError> {
        let mut bill = self.find_bill(bill_id).await?;
        let expected_version = bill.version;

        bill.apply_discount(amount, notes)?;
        self.persist(&mut bill, expected_version).await?;

        tracing::info!(bill_id = %bill_id, discount = %amount, "Discount applied");
        Ok(bill)
    }

    pub async fn pay_bill(&self, bill_id: Uuid, method: PaymentMethod) -> Result<Bill, BillingError> {
        let mut bill = self.find_bill(bill_id).await?;
        let expected_version = bill.version;

        let event = bill.pay(method, Utc::now())?;
        self.persist(&mut bill, expected_version).await?;

        tracing::info!(
            bill_id = %bill_id,
            order_id = %bill.order_id,
            method = ?method,
            amount = %bill.final_amount,
            "💳 Bill paid"
        );

        publish_best_effort(self.sink.as_ref(), &EventEnvelope::new(event)).await;
        Ok(bill)
    }

    pub async fn cancel_bill(&self, bill_id: Uuid) -> Result<Bill, BillingError> {
        let mut bill = self.find_bill(bill_id).await?;
        let expected_version = bill.version;

        if !bill.cancel()? {
            tracing::debug!(bill_id = %bill_id, "Bill already cancelled");
            return Ok(bill);
        }
        self.persist(&mut bill, expected_version).await?;

        tracing::info!(bill_id = %bill_id, "Bill cancelled");
        Ok(bill)
    }

    pub async fn find_bill(&self, bill_id: Uuid) -> Result<Bill, BillingError> {
        self.repository
            .get(bill_id)
            .await?
            .ok_or(BillingError::NotFound(bill_id))
    }

    pub async fn find_by_order(&self, order_id: Uuid) -> Result<Option<Bill>, BillingError> {
        Ok(self.repository.find_by_order(order_id).await?)
    }

    async fn persist(&self, bill: &mut Bill, expected_version: i64) -> Result<(), BillingError> {
        bill.version = expected_version + 1;
        self.repository.update(bill, expected_version).await?;
        Ok(())
    }
}
