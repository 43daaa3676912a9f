use std::sync::Arc;
use kameo::prelude::*;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use restaurant_fulfillment::actors::{DeadLetterActor, GetDeadLetters, HealthMonitorActor, SystemHealth};
use restaurant_fulfillment::messaging::{
    EventDispatcher, EventListener, EventSink, KitchenEventHandler, OrderEventHandler, RedpandaClient,
};
use restaurant_fulfillment::metrics::{self, Metrics};
use restaurant_fulfillment::resilience::{
    CircuitBreaker, HttpOrderService, LocalOrderService, OrderService, ResilientOrderClient,
};
use restaurant_fulfillment::store::{
    ensure_schema, InMemoryBillRepository, InMemoryKitchenQueueRepository, InMemoryOrderRepository,
    ScyllaBillRepository, ScyllaKitchenQueueRepository, ScyllaOrderRepository,
};
use restaurant_fulfillment::{Config, FulfillmentServices, Repositories};

const DEAD_LETTER_CAPACITY: usize = 1000;

async fn connect_repositories(config: &Config) -> anyhow::Result<Repositories> {
    if !config.uses_scylla() {
        tracing::warn!("SCYLLA_NODES not set, using in-memory repositories (state is lost on restart)");
        return Ok(Repositories {
            orders: Arc::new(InMemoryOrderRepository::new()),
            kitchen: Arc::new(InMemoryKitchenQueueRepository::new()),
            bills: Arc::new(InMemoryBillRepository::new()),
        });
    }

    tracing::info!(nodes = ?config.scylla_nodes, "Connecting to ScyllaDB...");
    let session: Session = SessionBuilder::new()
        .known_nodes(&config.scylla_nodes)
        .build()
        .await?;

    ensure_schema(&session, &config.scylla_keyspace).await?;
    let session = Arc::new(session); // Wrap for sharing

    Ok(Repositories {
        orders: Arc::new(ScyllaOrderRepository::new(session.clone())),
        kitchen: Arc::new(ScyllaKitchenQueueRepository::new(session.clone())),
        bills: Arc::new(ScyllaBillRepository::new(session)),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging; override with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,restaurant_fulfillment=debug"))
        )
        .init();

    tracing::info!("🚀 Starting restaurant fulfillment service");

    let config = Config::from_env();
    tracing::debug!(config = ?config, "Configuration loaded");

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Storage ===
    let repositories = connect_repositories(&config).await?;

    // === 3. Event bus producer (with circuit breaker) ===
    let redpanda = Arc::new(RedpandaClient::new(&config.redpanda_brokers)?.with_metrics(metrics.clone()));
    let sink: Arc<dyn EventSink> = redpanda.clone();

    // === 4. Managers ===
    let order_service: Arc<dyn OrderService> = match config.order_service_url {
        Some(ref url) => {
            tracing::info!(url = %url, "Order lookup over HTTP");
            Arc::new(HttpOrderService::new(url.as_str(), config.order_lookup_timeout())?)
        }
        None => {
            tracing::info!("Order lookup in-process");
            Arc::new(LocalOrderService::new(repositories.orders.clone()))
        }
    };
    let lookup_breaker = CircuitBreaker::new("order_lookup", config.order_lookup_breaker())
        .with_metrics(metrics.clone());
    let order_client = Arc::new(ResilientOrderClient::new(order_service, lookup_breaker.clone()));
    let services = FulfillmentServices::new(
        &repositories,
        order_client,
        sink.clone(),
        config.billing_policy(),
        Some(metrics.clone()),
    );

    // === 5. Infrastructure actors ===
    let (health_tx, health_rx) = watch::channel(SystemHealth::starting());
    let _health_monitor = HealthMonitorActor::spawn(
        HealthMonitorActor::new(health_tx)
            .watch_breaker(lookup_breaker)
            .watch_breaker(redpanda.circuit_breaker().clone())
            .with_metrics(metrics.clone()),
    );
    let dead_letters = DeadLetterActor::spawn(
        DeadLetterActor::new(DEAD_LETTER_CAPACITY).with_metrics(metrics.clone()),
    );

    // Metrics HTTP server on its own thread/runtime
    let registry = metrics.registry().clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Metrics runtime error: {}", e);
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(registry, health_rx, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 6. Event consumers ===
    let dispatcher = Arc::new(
        EventDispatcher::new()
            .register(Arc::new(OrderEventHandler::new(services.orders.clone())))
            .register(Arc::new(KitchenEventHandler::new(services.kitchen.clone())))
            .with_dead_letters(Arc::new(dead_letters.clone()))
            .with_metrics(metrics.clone()),
    );
    let listener = EventListener::new(&config.redpanda_brokers, &config.consumer_group, dispatcher)?;
    let listener_task = tokio::spawn(listener.run());

    tracing::info!("✅ Fulfillment service running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    listener_task.abort();

    match dead_letters.ask(GetDeadLetters { limit: 0 }).await {
        Ok(report) => tracing::info!(
            total = report.total_parked,
            by_topic = ?report.by_topic,
            "Dead letters parked during this run"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not read dead letter report"),
    }

    // Request-layer handle stays live for the whole run
    drop(services);
    tracing::info!("👋 Stopped");
    Ok(())
}
