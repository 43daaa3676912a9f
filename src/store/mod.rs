// ============================================================================
// Repository Ports - Persistence Boundary
// ============================================================================
//
// Every aggregate is written through an optimistic version check:
//
//   update(aggregate, expected_version)
//
// succeeds only when the stored version still equals `expected_version`;
// the caller has already bumped `aggregate.version` to expected + 1.
// A mismatch is a VersionConflict and nothing is written.
//
// Adapters:
// - memory: tokio RwLock maps (tests, single-process runs)
// - scylla: JSON payload + version column, conditional writes (LWT)
//
// ============================================================================

mod memory;
mod scylla_store;

pub use memory::{InMemoryBillRepository, InMemoryKitchenQueueRepository, InMemoryOrderRepository};
pub use scylla_store::{ensure_schema, ScyllaBillRepository, ScyllaKitchenQueueRepository, ScyllaOrderRepository};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::billing::Bill;
use crate::domain::kitchen::KitchenQueueItem;
use crate::domain::order::Order;
use crate::domain::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{aggregate} not found: {id}")]
    NotFound { aggregate: &'static str, id: Uuid },

    #[error("Concurrency conflict on {aggregate} {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        aggregate: &'static str,
        id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("{aggregate} already exists for key {key}")]
    Duplicate { aggregate: &'static str, key: Uuid },

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl RepositoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound { .. } => ErrorKind::NotFound,
            RepositoryError::VersionConflict { .. } | RepositoryError::Duplicate { .. } => {
                ErrorKind::Conflict
            }
            RepositoryError::Backend(_) => ErrorKind::Internal,
        }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Store a new order; Duplicate if the id is taken
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError>;

    async fn update(&self, order: &Order, expected_version: i64) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait KitchenQueueRepository: Send + Sync {
    /// Store one order's ticket. The first ticket for an order wins; later
    /// calls store nothing new and return the items already on record.
    async fn insert_ticket(
        &self,
        order_id: Uuid,
        items: &[KitchenQueueItem],
    ) -> Result<Vec<KitchenQueueItem>, RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<KitchenQueueItem>, RepositoryError>;

    async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<KitchenQueueItem>, RepositoryError>;

    /// Items still PENDING or IN_PROGRESS, oldest first
    async fn find_active(&self) -> Result<Vec<KitchenQueueItem>, RepositoryError>;

    async fn update(&self, item: &KitchenQueueItem, expected_version: i64) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BillRepository: Send + Sync {
    /// Store a new bill; Duplicate if the order already has one
    async fn insert(&self, bill: &Bill) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Bill>, RepositoryError>;

    async fn find_by_order(&self, order_id: Uuid) -> Result<Option<Bill>, RepositoryError>;

    async fn update(&self, bill: &Bill, expected_version: i64) -> Result<(), RepositoryError>;
}
