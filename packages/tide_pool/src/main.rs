use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod bridge;
mod config;
mod handlers;
mod metrics;
mod protocol;
mod registry;

#[cfg(test)]
mod e2e_tests;

use pty_session::{SessionActor, SessionConfig, SessionHandle};

use crate::config::{BridgeConfig, FileConfig};
use crate::metrics::ServerMetrics;
use crate::registry::ClientRegistry;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "tidepool")]
#[command(about = "Share one persistent terminal session with every screen you own")]
struct Cli {
    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server
    #[arg(short, long)]
    port: Option<u16>,

    /// Terminal multiplexer session name to create or reattach to
    #[arg(short, long)]
    session: Option<String>,

    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub session: SessionHandle,
    pub registry: Arc<ClientRegistry>,
    pub metrics: Arc<ServerMetrics>,
    pub config: Arc<BridgeConfig>,
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::terminal_page))
        .route("/ws", get(handlers::websocket_handler))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "tide_pool=debug,pty_session=debug,tower_http=debug,info"
    } else {
        "tide_pool=info,pty_session=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting Tide Pool - shared terminal bridge");

    let mut file_config = FileConfig::load(&cli.config)?;
    if let Some(host) = cli.host {
        file_config.server.host = host;
    }
    if let Some(port) = cli.port {
        file_config.server.port = port;
    }
    if let Some(session) = cli.session {
        file_config.session.name = session;
    }
    let config = Arc::new(BridgeConfig::from_file(&file_config)?);

    // The one terminal session for the lifetime of this process. Startup is
    // the only place a PTY failure is fatal.
    let session = SessionActor::spawn(SessionConfig {
        command: config.session.command.clone(),
        args: config.session.args.clone(),
        working_dir: config.session.working_dir.clone(),
        env: Vec::new(),
        cols: config.session.cols,
        rows: config.session.rows,
    })
    .context("failed to start the terminal session")?;

    let registry = Arc::new(ClientRegistry::new());
    let metrics = Arc::new(ServerMetrics::new());

    bridge::spawn_output_pump(session.subscribe(), registry.clone(), metrics.clone());

    let app_state = AppState {
        session,
        registry,
        metrics,
        config: config.clone(),
    };

    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Tide Pool listening on http://{}", actual_addr);
    info!("Web terminal: http://{}/", actual_addr);
    info!(
        "Session: {} ({} {})",
        config.session.name,
        config.session.command,
        config.session.args.join(" ")
    );

    // No shutdown sequence on purpose: killing the bridge leaves the
    // multiplexer session running for the next bridge instance to reattach.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")
}
