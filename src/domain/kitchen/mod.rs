// ============================================================================
// Kitchen Domain - Per-Dish Preparation
// ============================================================================
//
// - Value objects (KitchenQueueItem, KitchenStatus, OrderProgress)
// - Errors (KitchenError)
// - Manager (KitchenQueueManager, KitchenPort)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod manager;

pub use value_objects::*;
pub use errors::*;
pub use manager::*;
