use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::watch;

use crate::actors::SystemHealth;

/// Start the metrics HTTP server.
/// Runs on its own thread/runtime; health is read from the monitor's watch channel.
pub async fn start_metrics_server(
    registry: Registry,
    health: watch::Receiver<SystemHealth>,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(health.clone()))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(registry: web::Data<Registry>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(health: web::Data<watch::Receiver<SystemHealth>>) -> impl Responder {
    let snapshot = health.borrow().clone();

    let body = serde_json::json!({
        "status": snapshot.overall.as_str(),
        "service": "restaurant-fulfillment",
        "components": snapshot.components,
    });

    if snapshot.overall.is_serving() {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
