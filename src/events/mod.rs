// ============================================================================
// Event Envelope & Bus Contract
// ============================================================================
//
// Message format shared by every producer and consumer.
//
// Delivery contract assumed by all handlers:
// - at-least-once
// - in order within one aggregate (partition key = order id)
// - no ordering across aggregates
//
// Every consumer must therefore be idempotent.
//
// ============================================================================

mod envelope;
mod payloads;

pub use envelope::{DomainEvent, EventEnvelope, serialize_envelope, decode_envelope};
pub use payloads::*;
