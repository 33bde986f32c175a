use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agentmesh_registry::services::{NullGateway, PostgresGateway};
use agentmesh_registry::{
    handlers, AppState, BookingSweepJob, Config, LivenessSweepJob, PersistenceGateway,
    SweepJobConfig,
};

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "agentmesh-registry"
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentmesh_registry=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    info!(
        "Starting AgentMesh registry on {}:{}",
        config.host, config.port
    );

    // Persistence is best-effort: a missing or unreachable database degrades
    // to in-memory-only operation, never to a failed boot.
    let gateway: Arc<dyn PersistenceGateway> = match &config.database_url {
        Some(url) => match PostgresGateway::connect(url, config.database_max_connections).await {
            Ok(gateway) => {
                info!("Persistence gateway connected");
                Arc::new(gateway)
            }
            Err(e) => {
                warn!("Persistence unavailable: {e}. Serving the in-memory set only.");
                Arc::new(NullGateway)
            }
        },
        None => {
            info!("No DATABASE_URL configured; serving the in-memory set only");
            Arc::new(NullGateway)
        }
    };

    let state = AppState::new(config.clone(), gateway);
    state.store.hydrate().await;

    // Background sweeps: expired-booking reclamation and stale-agent
    // deactivation
    let sweep_config = SweepJobConfig {
        interval: Duration::from_secs(config.sweep_interval_secs),
        enabled: true,
    };
    let _booking_sweep =
        BookingSweepJob::new(state.bookings.clone(), sweep_config.clone()).start();
    let _liveness_sweep = LivenessSweepJob::new(
        state.store.clone(),
        state.liveness.clone(),
        chrono::Duration::seconds(config.heartbeat_stale_secs),
        sweep_config,
    )
    .start();

    let app_state = web::Data::new(state);
    let server_addr = format!("{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .wrap(Cors::permissive())
            .route("/health", web::get().to(health_check))
            .configure(handlers::configure_agent_routes)
            .configure(handlers::configure_booking_routes)
    })
    .bind(&server_addr)?
    .run()
    .await
}
