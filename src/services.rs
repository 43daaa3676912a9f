use std::sync::Arc;

use crate::domain::billing::{BillingGenerator, BillingPolicy};
use crate::domain::kitchen::KitchenQueueManager;
use crate::domain::order::OrderLifecycleManager;
use crate::messaging::EventSink;
use crate::metrics::Metrics;
use crate::resilience::ResilientOrderClient;
use crate::store::{BillRepository, KitchenQueueRepository, OrderRepository};

// ============================================================================
// Service Wiring
// ============================================================================
//
// The three aggregate owners, wired to their ports. A request layer takes
// this struct (or clones of its Arcs); the event consumers take the order
// and kitchen managers.
//
// ============================================================================

pub struct Repositories {
    pub orders: Arc<dyn OrderRepository>,
    pub kitchen: Arc<dyn KitchenQueueRepository>,
    pub bills: Arc<dyn BillRepository>,
}

#[derive(Clone)]
pub struct FulfillmentServices {
    pub orders: Arc<OrderLifecycleManager>,
    pub kitchen: Arc<KitchenQueueManager>,
    pub billing: Arc<BillingGenerator>,
}

impl FulfillmentServices {
    pub fn new(
        repositories: &Repositories,
        order_client: Arc<ResilientOrderClient>,
        sink: Arc<dyn EventSink>,
        policy: BillingPolicy,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let kitchen = Arc::new(KitchenQueueManager::new(repositories.kitchen.clone(), sink.clone()));

        let mut orders = OrderLifecycleManager::new(repositories.orders.clone(), kitchen.clone(), sink.clone());
        if let Some(metrics) = metrics {
            orders = orders.with_metrics(metrics);
        }

        let billing = Arc::new(BillingGenerator::new(
            repositories.bills.clone(),
            order_client,
            sink,
            policy,
        ));

        Self { orders: Arc::new(orders), kitchen, billing }
    }
}
