mod auth;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod routes;
mod services;
mod utils;
mod ws;

use config::Config;
use db::open_store;
use routes::create_app;
use services::{auth_service::Authenticator, doc_edit_service::DocEditService};
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ws::{hub::RoomHub, socket::ConnTiming};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RoomHub>,
    pub docs: Arc<DocEditService>,
    pub authenticator: Arc<Authenticator>,
    pub timing: ConnTiming,
}

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "labnote_collab=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if config.jwt_secret.is_none() {
        error!("No JWT secret configured - every connection and API request will be rejected");
    }

    // Pick the document store
    if config.db_url.is_none() {
        if !config.is_development() {
            warn!("No database URL configured outside development - documents will not survive a restart");
        } else {
            warn!("No database URL configured - using the in-memory document store");
        }
    }
    let store = match open_store(config.db_url.as_deref()).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        hub: Arc::new(RoomHub::new()),
        docs: Arc::new(DocEditService::new(store)),
        authenticator: Arc::new(Authenticator::new(config.jwt_secret.as_deref())),
        timing: config.conn_timing(),
    };

    let app = create_app(state, &config.cors_origin);

    // Start the HTTP/WebSocket server
    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());
    info!("CORS origin: {}", config.cors_origin);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
