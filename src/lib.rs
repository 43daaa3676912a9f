// ============================================================================
// Restaurant Order Fulfillment
// ============================================================================
//
// Coordination between three aggregates owned by separate services:
//
//   Order ──OrderSentToKitchen──► KitchenQueueItem ──DishReady──► Order
//     │
//     └──(sync lookup, circuit breaker)──► Bill ──BillGenerated / BillPaid──►
//
// Layout:
// - domain/      state machines and their managers
// - events/      envelope + payloads (the bus contract)
// - store/       repository ports with optimistic versioning, adapters
// - messaging/   event sink, Redpanda producer, consumer + dispatcher
// - resilience/  circuit breaker, retry, guarded order lookup
// - actors/      health monitor, dead letters (kameo)
// - metrics/     Prometheus registry and HTTP endpoint
// - services     the three managers wired to their ports
//
// ============================================================================

pub mod actors;
pub mod config;
pub mod domain;
pub mod events;
pub mod messaging;
pub mod metrics;
pub mod resilience;
pub mod services;
pub mod store;

pub use config::Config;
pub use domain::ErrorKind;
pub use services::{FulfillmentServices, Repositories};
