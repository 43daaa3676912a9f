// ============================================================================
// Actors Module
// ============================================================================
//
// kameo actors for infrastructure concerns:
// - health_monitor: breaker polling and aggregated system health
// - dead_letter:    parking lot for messages whose handling failed
//
// Note: Domain logic (orders, kitchen, billing) lives in managers, NOT actors.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

mod health;
mod health_monitor;
mod dead_letter;

pub use health::{ComponentHealth, HealthStatus, SystemHealth};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, UpdateHealth};
pub use dead_letter::{DeadLetter, DeadLetterActor, DeadLetterReport, GetDeadLetters, ParkDeadLetter};
