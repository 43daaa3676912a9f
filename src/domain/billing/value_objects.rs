use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::events::{BillGeneratedEvent, BillPaidEvent};
use super::errors::BillingError;

// ============================================================================
// Bill Status
// ============================================================================
//
//   PENDING → PAID
//   PENDING → CANCELLED
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillStatus {
    Pending,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    DebitCard,
    MobilePayment,
}

/// Rates applied to the order subtotal at generation time
#[derive(Debug, Clone, PartialEq)]
pub struct BillingPolicy {
    pub tax_rate: Decimal,
    pub service_charge_rate: Decimal,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(10, 2),
            service_charge_rate: Decimal::new(5, 2),
        }
    }
}

fn to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl BillingPolicy {
    pub fn tax_on(&self, subtotal: Decimal) -> Decimal {
        to_cents(subtotal * self.tax_rate)
    }

    pub fn service_charge_on(&self, subtotal: Decimal) -> Decimal {
        to_cents(subtotal * self.service_charge_rate)
    }
}

// ============================================================================
// Bill Aggregate
// ============================================================================
//
// final_amount = total_amount + tax_amount + service_charge - discount_amount
// holds after every mutation. All amounts are exact decimals.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Order subtotal the bill was generated from
    pub total_amount: Decimal,
    pub tax_amount: Decimal,
    pub service_charge: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
    pub status: BillStatus,
    pub payment_method: Option<PaymentMethod>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub version: i64,
}

impl Bill {
    pub fn generate(order_id: Uuid, subtotal: Decimal, policy: &BillingPolicy) -> Self {
        let mut bill = Self {
            id: Uuid::new_v4(),
            order_id,
            total_amount: subtotal,
            tax_amount: policy.tax_on(subtotal),
            service_charge: policy.service_charge_on(subtotal),
            discount_amount: Decimal::ZERO,
            final_amount: Decimal::ZERO,
            status: BillStatus::Pending,
            payment_method: None,
            created_at: Utc::now(),
            paid_at: None,
            notes: None,
            version: 0,
        };
        bill.recompute_final();
        bill
    }

    fn recompute_final(&mut self) {
        self.final_amount =
            self.total_amount + self.tax_amount + self.service_charge - self.discount_amount;
    }

    pub fn is_balanced(&self) -> bool {
        self.final_amount
            == self.total_amount + self.tax_amount + self.service_charge - self.discount_amount
    }

    pub fn can_be_cancelled(&self) -> bool {
        self.status != BillStatus::Paid
    }

    fn ensure_pending(&self) -> Result<(), BillingError> {
        match self.status {
            BillStatus::Pending => Ok(()),
            BillStatus::Paid => Err(BillingError::AlreadyPaid(self.id)),
            status => Err(BillingError::NotPending { bill_id: self.id, status }),
        }
    }

    /// Set (not add to) the discount. No upper bound is enforced.
    pub fn apply_discount(&mut self, amount: Decimal, notes: Option<String>) -> Result<(), BillingError> {
        if amount < Decimal::ZERO {
            return Err(BillingError::NegativeDiscount(amount));
        }
        self.ensure_pending()?;

        self.discount_amount = amount;
        if notes.is_some() {
            self.notes = notes;
        }
        self.recompute_final();
        Ok(())
    }

    pub fn pay(&mut self, method: PaymentMethod, paid_at: DateTime<Utc>) -> Result<BillPaidEvent, BillingError> {
        self.ensure_pending()?;

        self.status = BillStatus::Paid;
        self.payment_method = Some(method);
        self.paid_at = Some(paid_at);

        Ok(BillPaidEvent {
            bill_id: self.id,
            order_id: self.order_id,
            amount_paid: self.final_amount,
            payment_method: method,
            paid_at,
        })
    }

    /// Returns false when the bill was already cancelled
    pub fn cancel(&mut self) -> Result<bool, BillingError> {
        match self.status {
            BillStatus::Paid => Err(BillingError::AlreadyPaid(self.id)),
            BillStatus::Cancelled => Ok(false),
            BillStatus::Pending => {
                self.status = BillStatus::Cancelled;
                Ok(true)
            }
        }
    }

    pub fn generated_event(&self) -> BillGeneratedEvent {
        BillGeneratedEvent {
            bill_id: self.id,
            order_id: self.order_id,
            subtotal: self.total_amount,
            tax: self.tax_amount,
            service_charge: self.service_charge,
            total_amount: self.final_amount,
            generated_at: self.created_at,
        }
    }
}
