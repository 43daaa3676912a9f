// ============================================================================
// Domain Layer - Fulfillment State Machines
// ============================================================================
//
// One subdirectory per aggregate, each with:
// - value objects (aggregate state and its status graph)
// - errors
// - the manager that owns the aggregate
//
// Managers talk to storage and the bus only through ports (crate::store,
// crate::messaging), never through concrete adapters.
//
// ============================================================================

pub mod order;
pub mod kitchen;
pub mod billing;

/// Error taxonomy shared by every aggregate error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Aggregate id unknown
    NotFound,
    /// Duplicate bill, illegal state transition, stale version
    Conflict,
    /// Malformed input
    Validation,
    /// Order lookup circuit open or timed out
    ServiceUnavailable,
    /// Storage backend failure
    Internal,
}
