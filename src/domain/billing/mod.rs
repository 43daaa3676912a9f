// ============================================================================
// Billing Domain - Bill Generation and Settlement
// ============================================================================
//
// - Value objects (Bill, BillStatus, PaymentMethod, BillingPolicy)
// - Errors (BillingError)
// - Generator (BillingGenerator)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod generator;

pub use value_objects::*;
pub use errors::*;
pub use generator::*;
