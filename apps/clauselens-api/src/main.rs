//! ClauseLens API Server - Backend for contract upload and review
//!
//! Provides REST endpoints for:
//! - Document upload and listing
//! - Staged analysis polling and results
//! - Signed file download URLs
//! - Profiles and the legal-assistant chat

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod error;
mod handlers;
mod state;

use state::AppState;

/// Command-line arguments for the ClauseLens API server
#[derive(Parser, Debug)]
#[command(name = "clauselens-api")]
#[command(about = "ClauseLens API server for contract upload and review")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3001")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Route table, shared with the in-crate integration tests.
pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Profile bootstrap (bearer still required; see handlers::signup)
        .route("/api/signup", post(handlers::signup))
        // Document endpoints
        .route("/api/documents/upload", post(handlers::upload_document))
        .route("/api/documents", get(handlers::list_documents))
        .route(
            "/api/documents/:id/analysis",
            get(handlers::get_document_analysis),
        )
        .route("/api/documents/:id/file", get(handlers::get_document_file))
        // Profile
        .route(
            "/api/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        // Chat assistant
        .route("/api/chat", post(handlers::post_chat))
        // Signed file delivery
        .route("/files/*path", get(handlers::serve_file))
        .layer(DefaultBodyLimit::max(handlers::MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Initializing ClauseLens API...");
    let state = Arc::new(AppState::new().await?);

    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("ClauseLens API listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
