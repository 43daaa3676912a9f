use std::sync::Arc;
use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::serialize::row::SerializeRow;
use scylla::value::{CqlValue, Row};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::domain::billing::Bill;
use crate::domain::kitchen::KitchenQueueItem;
use crate::domain::order::Order;
use super::{BillRepository, KitchenQueueRepository, OrderRepository, RepositoryError};

// ============================================================================
// ScyllaDB Repositories
// ============================================================================
//
// Each aggregate is stored as a JSON payload next to its version column.
// Writes are lightweight transactions:
//
//   INSERT ... IF NOT EXISTS            (new aggregate / unique key)
//   UPDATE ... IF version = ?           (optimistic concurrency)
//
// Bill uniqueness per order is enforced by `bills_by_order`, claimed with
// IF NOT EXISTS after the bill row is written. Kitchen tickets are claimed
// the same way in `kitchen_tickets`, before their item rows are written.
//
// ============================================================================

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS orders (
        id uuid PRIMARY KEY,
        version bigint,
        payload text
    )",
    "CREATE TABLE IF NOT EXISTS kitchen_queue (
        id uuid PRIMARY KEY,
        order_id uuid,
        version bigint,
        active boolean,
        payload text
    )",
    "CREATE TABLE IF NOT EXISTS kitchen_tickets (
        order_id uuid PRIMARY KEY,
        item_ids list<uuid>
    )",
    "CREATE TABLE IF NOT EXISTS bills (
        id uuid PRIMARY KEY,
        order_id uuid,
        version bigint,
        payload text
    )",
    "CREATE TABLE IF NOT EXISTS bills_by_order (
        order_id uuid PRIMARY KEY,
        bill_id uuid
    )",
];

/// Create the keyspace and tables if missing, and switch the session to it
pub async fn ensure_schema(session: &Session, keyspace: &str) -> anyhow::Result<()> {
    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                keyspace
            ),
            &[],
        )
        .await?;

    session.use_keyspace(keyspace, false).await?;

    for statement in SCHEMA {
        session.query_unpaged(statement, &[]).await?;
    }

    tracing::info!(keyspace = %keyspace, "✅ Fulfillment schema ready");
    Ok(())
}

fn backend<E: Into<anyhow::Error>>(error: E) -> RepositoryError {
    RepositoryError::Backend(error.into())
}

/// Outcome of a conditional write
struct LwtOutcome {
    applied: bool,
    /// Current `version` when the condition failed (None if the row is missing)
    current_version: Option<i64>,
}

async fn execute_lwt(
    session: &Session,
    query: &str,
    values: impl SerializeRow,
) -> Result<LwtOutcome, RepositoryError> {
    let result = session.query_unpaged(query, values).await.map_err(backend)?;
    let rows = result.into_rows_result().map_err(backend)?;
    let row = rows.maybe_first_row::<Row>().map_err(backend)?;

    let Some(row) = row else {
        return Err(backend(anyhow::anyhow!("Conditional write returned no rows")));
    };

    let applied = matches!(row.columns.first(), Some(Some(CqlValue::Boolean(true))));
    let current_version = match row.columns.get(1) {
        Some(Some(CqlValue::BigInt(version))) => Some(*version),
        _ => None,
    };

    Ok(LwtOutcome { applied, current_version })
}

async fn load_payload<T: DeserializeOwned>(
    session: &Session,
    query: &str,
    id: Uuid,
) -> Result<Option<T>, RepositoryError> {
    let result = session.query_unpaged(query, (id,)).await.map_err(backend)?;
    let rows = result.into_rows_result().map_err(backend)?;

    match rows.maybe_first_row::<(String,)>().map_err(backend)? {
        Some((payload,)) => Ok(Some(serde_json::from_str(&payload).map_err(backend)?)),
        None => Ok(None),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(backend)
}

fn versioned_update_outcome(
    aggregate: &'static str,
    id: Uuid,
    expected: i64,
    outcome: LwtOutcome,
) -> Result<(), RepositoryError> {
    if outcome.applied {
        return Ok(());
    }
    match outcome.current_version {
        Some(actual) => Err(RepositoryError::VersionConflict { aggregate, id, expected, actual }),
        None => Err(RepositoryError::NotFound { aggregate, id }),
    }
}

// ============================================================================
// Orders
// ============================================================================

pub struct ScyllaOrderRepository {
    session: Arc<Session>,
}

impl ScyllaOrderRepository {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl OrderRepository for ScyllaOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let outcome = execute_lwt(
            &self.session,
            "INSERT INTO orders (id, version, payload) VALUES (?, ?, ?) IF NOT EXISTS",
            (order.id, order.version, to_json(order)?),
        )
        .await?;

        if !outcome.applied {
            return Err(RepositoryError::Duplicate { aggregate: "Order", key: order.id });
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        load_payload(&self.session, "SELECT payload FROM orders WHERE id = ?", id).await
    }

    async fn update(&self, order: &Order, expected_version: i64) -> Result<(), RepositoryError> {
        let outcome = execute_lwt(
            &self.session,
            "UPDATE orders SET version = ?, payload = ? WHERE id = ? IF version = ?",
            (order.version, to_json(order)?, order.id, expected_version),
        )
        .await?;

        tracing::debug!(
            order_id = %order.id,
            version = order.version,
            applied = outcome.applied,
            "Conditional order update"
        );

        versioned_update_outcome("Order", order.id, expected_version, outcome)
    }
}

// ============================================================================
// Kitchen Queue
// ============================================================================

pub struct ScyllaKitchenQueueRepository {
    session: Arc<Session>,
}

impl ScyllaKitchenQueueRepository {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

/// Line up a ticket's items with the ids recorded by its claim. A ticket is
/// replayed as the same lines in the same order, so position identifies the
/// line; the claimed ids replace freshly generated ones.
fn assign_ticket_ids(
    order_id: Uuid,
    claimed_ids: &[Uuid],
    items: &[KitchenQueueItem],
) -> Result<Vec<KitchenQueueItem>, RepositoryError> {
    if claimed_ids.len() != items.len() {
        return Err(backend(anyhow::anyhow!(
            "Ticket for order {} has {} lines, claim records {}",
            order_id,
            items.len(),
            claimed_ids.len()
        )));
    }

    Ok(claimed_ids
        .iter()
        .zip(items)
        .map(|(id, item)| KitchenQueueItem { id: *id, ..item.clone() })
        .collect())
}

impl ScyllaKitchenQueueRepository {
    async fn ticket_ids(&self, order_id: Uuid) -> Result<Option<Vec<Uuid>>, RepositoryError> {
        let result = self
            .session
            .query_unpaged("SELECT item_ids FROM kitchen_tickets WHERE order_id = ?", (order_id,))
            .await
            .map_err(backend)?;
        let rows = result.into_rows_result().map_err(backend)?;

        // An empty list column reads back as null
        Ok(rows
            .maybe_first_row::<(Option<Vec<Uuid>>,)>()
            .map_err(backend)?
            .map(|(ids,)| ids.unwrap_or_default()))
    }

    async fn load_items(&self, ids: &[Uuid]) -> Result<Vec<KitchenQueueItem>, RepositoryError> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.get(*id).await? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl KitchenQueueRepository for ScyllaKitchenQueueRepository {
    // The claim goes first, so every item row that exists is reachable from
    // its order. Rows are written IF NOT EXISTS: a replayed ticket fills in
    // rows an interrupted attempt left out and never overwrites progress.
    async fn insert_ticket(
        &self,
        order_id: Uuid,
        items: &[KitchenQueueItem],
    ) -> Result<Vec<KitchenQueueItem>, RepositoryError> {
        let ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
        let claim = execute_lwt(
            &self.session,
            "INSERT INTO kitchen_tickets (order_id, item_ids) VALUES (?, ?) IF NOT EXISTS",
            (order_id, ids.clone()),
        )
        .await?;

        let claimed_ids = if claim.applied {
            ids
        } else {
            self.ticket_ids(order_id).await?.unwrap_or_default()
        };

        let ticket = assign_ticket_ids(order_id, &claimed_ids, items)?;
        let mut written = 0;
        for item in &ticket {
            let outcome = execute_lwt(
                &self.session,
                "INSERT INTO kitchen_queue (id, order_id, version, active, payload) \
                 VALUES (?, ?, ?, ?, ?) IF NOT EXISTS",
                (item.id, item.order_id, item.version, item.is_active(), to_json(item)?),
            )
            .await?;
            if outcome.applied {
                written += 1;
            }
        }

        tracing::debug!(
            order_id = %order_id,
            claimed = claim.applied,
            written = written,
            "Stored kitchen ticket"
        );

        if claim.applied {
            Ok(ticket)
        } else {
            self.load_items(&claimed_ids).await
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<KitchenQueueItem>, RepositoryError> {
        load_payload(&self.session, "SELECT payload FROM kitchen_queue WHERE id = ?", id).await
    }

    async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<KitchenQueueItem>, RepositoryError> {
        match self.ticket_ids(order_id).await? {
            Some(ids) => self.load_items(&ids).await,
            None => Ok(Vec::new()),
        }
    }

    async fn find_active(&self) -> Result<Vec<KitchenQueueItem>, RepositoryError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT payload FROM kitchen_queue WHERE active = true ALLOW FILTERING",
                &[],
            )
            .await
            .map_err(backend)?;
        let rows = result.into_rows_result().map_err(backend)?;

        let mut items = Vec::new();
        for row in rows.rows::<(String,)>().map_err(backend)? {
            let (payload,) = row.map_err(backend)?;
            items.push(serde_json::from_str::<KitchenQueueItem>(&payload).map_err(backend)?);
        }
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    async fn update(&self, item: &KitchenQueueItem, expected_version: i64) -> Result<(), RepositoryError> {
        let outcome = execute_lwt(
            &self.session,
            "UPDATE kitchen_queue SET version = ?, active = ?, payload = ? WHERE id = ? IF version = ?",
            (item.version, item.is_active(), to_json(item)?, item.id, expected_version),
        )
        .await?;

        versioned_update_outcome("KitchenQueueItem", item.id, expected_version, outcome)
    }
}

// ============================================================================
// Bills
// ============================================================================

pub struct ScyllaBillRepository {
    session: Arc<Session>,
}

impl ScyllaBillRepository {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

/// State of an order's bill claim that this insert did not win
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BillClaim {
    /// The claimed bill row exists: the order is billed
    Held(Uuid),
    /// The claim names a bill row that was never written
    Stale(Uuid),
    /// The claim disappeared between the insert and the read
    Missing,
}

impl BillClaim {
    fn classify(claimed_bill: Option<Uuid>, claimed_row_exists: bool) -> Self {
        match claimed_bill {
            Some(bill_id) if claimed_row_exists => BillClaim::Held(bill_id),
            Some(bill_id) => BillClaim::Stale(bill_id),
            None => BillClaim::Missing,
        }
    }
}

impl ScyllaBillRepository {
    async fn claimed_bill(&self, order_id: Uuid) -> Result<Option<Uuid>, RepositoryError> {
        let result = self
            .session
            .query_unpaged("SELECT bill_id FROM bills_by_order WHERE order_id = ?", (order_id,))
            .await
            .map_err(backend)?;
        let rows = result.into_rows_result().map_err(backend)?;
        Ok(rows.maybe_first_row::<(Uuid,)>().map_err(backend)?.map(|(bill_id,)| bill_id))
    }

    /// Resolve a lost claim. Returns true when this bill ends up owning it.
    async fn resolve_claim(&self, bill: &Bill) -> Result<bool, RepositoryError> {
        let claimed = self.claimed_bill(bill.order_id).await?;
        let claimed_row_exists = match claimed {
            Some(bill_id) => self.get(bill_id).await?.is_some(),
            None => false,
        };

        match BillClaim::classify(claimed, claimed_row_exists) {
            BillClaim::Held(holder) => {
                tracing::debug!(order_id = %bill.order_id, bill_id = %holder, "Order already billed");
                Ok(false)
            }
            BillClaim::Stale(stale_bill_id) => {
                tracing::warn!(
                    order_id = %bill.order_id,
                    stale_bill_id = %stale_bill_id,
                    "Taking over bill claim whose bill row was never written"
                );
                let takeover = execute_lwt(
                    &self.session,
                    "UPDATE bills_by_order SET bill_id = ? WHERE order_id = ? IF bill_id = ?",
                    (bill.id, bill.order_id, stale_bill_id),
                )
                .await?;
                Ok(takeover.applied)
            }
            BillClaim::Missing => {
                let retry = execute_lwt(
                    &self.session,
                    "INSERT INTO bills_by_order (order_id, bill_id) VALUES (?, ?) IF NOT EXISTS",
                    (bill.order_id, bill.id),
                )
                .await?;
                Ok(retry.applied)
            }
        }
    }
}

#[async_trait]
impl BillRepository for ScyllaBillRepository {
    // The bill row is written before the order is claimed. Until the claim
    // lands the row is unreachable through find_by_order, so a failure at
    // any step never leaves a claim without its bill.
    async fn insert(&self, bill: &Bill) -> Result<(), RepositoryError> {
        self.session
            .query_unpaged(
                "INSERT INTO bills (id, order_id, version, payload) VALUES (?, ?, ?, ?)",
                (bill.id, bill.order_id, bill.version, to_json(bill)?),
            )
            .await
            .map_err(backend)?;

        let claim = execute_lwt(
            &self.session,
            "INSERT INTO bills_by_order (order_id, bill_id) VALUES (?, ?) IF NOT EXISTS",
            (bill.order_id, bill.id),
        )
        .await?;

        if claim.applied || self.resolve_claim(bill).await? {
            return Ok(());
        }

        if let Err(e) = self
            .session
            .query_unpaged("DELETE FROM bills WHERE id = ?", (bill.id,))
            .await
        {
            tracing::warn!(bill_id = %bill.id, error = %e, "Failed to remove unclaimed bill row");
        }
        Err(RepositoryError::Duplicate { aggregate: "Bill", key: bill.order_id })
    }

    async fn get(&self, id: Uuid) -> Result<Option<Bill>, RepositoryError> {
        load_payload(&self.session, "SELECT payload FROM bills WHERE id = ?", id).await
    }

    /// A claim whose bill row is missing reads as "no bill"
    async fn find_by_order(&self, order_id: Uuid) -> Result<Option<Bill>, RepositoryError> {
        match self.claimed_bill(order_id).await? {
            Some(bill_id) => self.get(bill_id).await,
            None => Ok(None),
        }
    }

    async fn update(&self, bill: &Bill, expected_version: i64) -> Result<(), RepositoryError> {
        let outcome = execute_lwt(
            &self.session,
            "UPDATE bills SET version = ?, payload = ? WHERE id = ? IF version = ?",
            (bill.version, to_json(bill)?, bill.id, expected_version),
        )
        .await?;

        versioned_update_outcome("Bill", bill.id, expected_version, outcome)
    }
}
