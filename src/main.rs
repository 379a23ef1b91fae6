use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use kz_whois::{
    config::Config,
    errors::WhoisError,
    lookup::LookupService,
    metrics,
    LookupResult,
};

// Headroom over the origin timeout for store and cache I/O
const REQUEST_TIMEOUT_PADDING_SECS: u64 = 10;

#[derive(Clone)]
pub struct AppState {
    lookup_service: Arc<LookupService>,
    config: Arc<Config>,
}

#[derive(Deserialize)]
struct LookupQuery {
    /// The domain name to look up (e.g., "example.kz")
    domain_name: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "kz_whois=info,tower_http=debug".into()),
        )
        .init();

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!("Configuration loaded successfully");

    // Initialize services
    let lookup_service = Arc::new(LookupService::connect(config.clone()).await?);

    // Initialize metrics
    metrics::init_metrics();

    let app_state = AppState {
        lookup_service: lookup_service.clone(),
        config: config.clone(),
    };

    let request_timeout = Duration::from_secs(config.origin_timeout_seconds + REQUEST_TIMEOUT_PADDING_SECS);

    // Build the application
    let app = Router::new()
        .route("/lookup_whois", get(lookup_whois))
        .route("/lookup_whois/", get(lookup_whois))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Whois service listening on {}", addr);
    info!("Lookup: http://{}/lookup_whois/?domain_name=example.kz", addr);
    info!("Health check: http://{}/health", addr);
    info!("Metrics: http://{}/metrics", addr);

    // Graceful shutdown handling
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, gracefully shutting down...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    lookup_service.shutdown().await;

    Ok(())
}

async fn lookup_whois(
    Query(params): Query<LookupQuery>,
    State(state): State<AppState>,
) -> Result<Json<LookupResult>, WhoisError> {
    let start_time = std::time::Instant::now();
    let domain = params.domain_name;

    metrics::increment_requests(&domain);

    let outcome = state.lookup_service.lookup_traced(&domain).await;
    metrics::record_lookup(
        outcome.as_ref().map(|lookup| lookup.source),
        start_time.elapsed().as_millis() as u64,
    );

    outcome.map(|lookup| Json(lookup.result))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.config.start_time.elapsed().as_secs(),
    })
}
