//! Compliance API Server
//!
//! HTTP surface over the compliance graph store. Provides REST endpoints for:
//!
//! - Triggering marketplace scans through the workflow webhook
//! - Recording scan results (directly or via the workflow callback)
//! - Listing and fetching results, and aggregate statistics
//! - Operator learnings

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use compliance_graph::{GraphConfig, GraphStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod extract;
mod state;
mod trigger;

use api::{
    handle_create_learning, handle_delete_learning, handle_get_result, handle_health,
    handle_ingest_result, handle_list_learnings, handle_list_results, handle_stats,
    handle_trigger_scan, handle_webhook_result,
};
use state::AppState;
use trigger::ScanTrigger;

/// Command-line arguments for the compliance API
#[derive(Parser, Debug)]
#[command(name = "compliance-api")]
#[command(about = "Compliance graph query and ingestion server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3002")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Serve empty results and zeroed stats while the store is unavailable
    #[arg(long)]
    degraded_reads: bool,

    /// Timeout for scan webhook delivery in milliseconds
    #[arg(long, default_value = "30000")]
    trigger_timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // Scan trigger and workflow callback
        .route("/compliance/check", post(handle_trigger_scan))
        .route("/compliance/webhook/result", post(handle_webhook_result))
        // Results
        .route(
            "/compliance/results",
            get(handle_list_results).post(handle_ingest_result),
        )
        .route("/compliance/results/:check_id", get(handle_get_result))
        .route("/compliance/stats", get(handle_stats))
        // Learnings
        .route(
            "/compliance/learnings",
            get(handle_list_learnings).post(handle_create_learning),
        )
        .route(
            "/compliance/learnings/:learning_id",
            delete(handle_delete_learning),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting compliance API on {}:{}", args.host, args.port);

    let config = GraphConfig::from_env()?;
    let store = GraphStore::connect(&config).await?;
    let trigger = ScanTrigger::from_env(Duration::from_millis(args.trigger_timeout_ms))?;
    info!("Scan webhook: {}", trigger.webhook_url());

    let state = AppState::new(store.clone(), trigger).with_degraded_reads(args.degraded_reads);

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    if args.degraded_reads {
        info!("Degraded reads enabled");
    }

    axum::serve(listener, app).await?;

    store.close().await;
    Ok(())
}
