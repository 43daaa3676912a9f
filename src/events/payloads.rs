use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::billing::PaymentMethod;
use super::envelope::DomainEvent;

// ============================================================================
// Topics
// ============================================================================

pub mod topics {
    pub const ORDERS_CREATED: &str = "orders.created";
    pub const ORDERS_SENT_TO_KITCHEN: &str = "orders.sent-to-kitchen";
    pub const KITCHEN_DISH_READY: &str = "kitchen.dish-ready";
    pub const BILLING_GENERATED: &str = "billing.generated";
    pub const BILLING_PAID: &str = "billing.paid";
}

// ============================================================================
// Order Events
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub table_id: Uuid,
    pub waiter_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderCreatedItem>,
    pub total_amount: Decimal,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedItem {
    pub item_id: Uuid,
    pub dish_id: Uuid,
    pub dish_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

impl DomainEvent for OrderCreatedEvent {
    fn event_type() -> &'static str { "OrderCreated" }
    fn topic() -> &'static str { topics::ORDERS_CREATED }
    fn aggregate_id(&self) -> Uuid { self.order_id }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderSentToKitchenEvent {
    pub order_id: Uuid,
    pub table_id: Uuid,
    pub sent_at: DateTime<Utc>,
    pub items: Vec<KitchenTicketItem>,
}

/// One line of the ticket handed to the kitchen
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KitchenTicketItem {
    pub order_item_id: Uuid,
    pub dish_id: Uuid,
    pub dish_name: String,
    pub quantity: i32,
    pub special_instructions: Option<String>,
}

impl DomainEvent for OrderSentToKitchenEvent {
    fn event_type() -> &'static str { "OrderSentToKitchen" }
    fn topic() -> &'static str { topics::ORDERS_SENT_TO_KITCHEN }
    fn aggregate_id(&self) -> Uuid { self.order_id }
}

// ============================================================================
// Kitchen Events
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DishReadyEvent {
    pub kitchen_queue_id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub dish_name: String,
    pub quantity: i32,
    pub ready_at: DateTime<Utc>,
}

impl DomainEvent for DishReadyEvent {
    fn event_type() -> &'static str { "DishReady" }
    fn topic() -> &'static str { topics::KITCHEN_DISH_READY }
    // Keyed by order so that all dishes of one order stay ordered
    fn aggregate_id(&self) -> Uuid { self.order_id }
}

// ============================================================================
// Billing Events
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BillGeneratedEvent {
    pub bill_id: Uuid,
    pub order_id: Uuid,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub service_charge: Decimal,
    pub total_amount: Decimal,
    pub generated_at: DateTime<Utc>,
}

impl DomainEvent for BillGeneratedEvent {
    fn event_type() -> &'static str { "BillGenerated" }
    fn topic() -> &'static str { topics::BILLING_GENERATED }
    fn aggregate_id(&self) -> Uuid { self.order_id }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BillPaidEvent {
    pub bill_id: Uuid,
    pub order_id: Uuid,
    pub amount_paid: Decimal,
    pub payment_method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
}

impl DomainEvent for BillPaidEvent {
    fn event_type() -> &'static str { "BillPaid" }
    fn topic() -> &'static str { topics::BILLING_PAID }
    fn aggregate_id(&self) -> Uuid { self.order_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{decode_envelope, serialize_envelope, EventEnvelope};

    #[test]
    fn test_dish_ready_wire_format() {
        let event = DishReadyEvent {
            kitchen_queue_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            order_item_id: Uuid::new_v4(),
            dish_name: "Margherita".to_string(),
            quantity: 2,
            ready_at: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        for field in ["kitchenQueueId", "orderId", "orderItemId", "dishName", "quantity", "readyAt"] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
    }

    #[test]
    fn test_bill_paid_envelope_keyed_by_order() {
        let order_id = Uuid::new_v4();
        let envelope = EventEnvelope::new(BillPaidEvent {
            bill_id: Uuid::new_v4(),
            order_id,
            amount_paid: Decimal::new(4725, 2),
            payment_method: PaymentMethod::CreditCard,
            paid_at: Utc::now(),
        });

        assert_eq!(envelope.topic(), topics::BILLING_PAID);
        assert_eq!(envelope.partition_key(), order_id.to_string());

        let json = serialize_envelope(&envelope).unwrap();
        assert!(json.contains("\"paymentMethod\":\"CREDIT_CARD\""));

        let decoded: EventEnvelope<BillPaidEvent> = decode_envelope(json.as_bytes()).unwrap();
        assert_eq!(decoded.payload().amount_paid, Decimal::new(4725, 2));
    }

    #[test]
    fn test_sent_to_kitchen_items_use_special_instructions() {
        let item = KitchenTicketItem {
            order_item_id: Uuid::new_v4(),
            dish_id: Uuid::new_v4(),
            dish_name: "Carbonara".to_string(),
            quantity: 1,
            special_instructions: Some("no pepper".to_string()),
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["specialInstructions"], "no pepper");
    }
}
