// ============================================================================
// Order Domain - Order Lifecycle
// ============================================================================
//
// - Value objects (Order, OrderItem, OrderStatus, OrderSnapshot)
// - Errors (OrderError)
// - Manager (OrderLifecycleManager)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod manager;

pub use value_objects::*;
pub use errors::*;
pub use manager::*;
