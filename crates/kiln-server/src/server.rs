//! Core server implementation

use crate::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    handlers,
};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use kiln_core::GenerationEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Main server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    pub engine: Arc<GenerationEngine>,
}

/// Build the router with all routes and middleware
pub fn create_router(state: ServerState) -> Router {
    let max_body_size = state.config.limits.max_body_size;

    Router::new()
        .route("/", get(handlers::status::status))
        .route("/health", get(handlers::health::health_check))
        .route("/v1/generate", post(handlers::generate::generate))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Kiln HTTP server
pub struct KilnServer {
    config: Arc<ServerConfig>,
    state: ServerState,
}

impl KilnServer {
    /// Create a server, loading the tokenizer and compiled artifact named by
    /// the configuration
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;

        let model_dir = config.model_dir();
        info!("Loading model from {}", model_dir.display());
        let engine = GenerationEngine::from_model_dir(
            config.engine_config(),
            &model_dir,
            &config.model.artifact,
            &config.tokenizer_config(),
        )?;

        Ok(Self::with_engine(config, engine))
    }

    /// Create a server around an already-constructed engine
    pub fn with_engine(config: ServerConfig, engine: GenerationEngine) -> Self {
        let config = Arc::new(config);
        let state = ServerState {
            config: Arc::clone(&config),
            engine: Arc::new(engine),
        };
        Self { config, state }
    }

    /// Serve until ctrl-c
    pub async fn start(self) -> ServerResult<()> {
        let addr = self.config.bind_addr()?;
        let app = create_router(self.state.clone());

        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get server state
    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

/// Create a server from an optional configuration file
pub fn create_server_from_config(config_path: Option<PathBuf>) -> ServerResult<KilnServer> {
    let config = if let Some(path) = config_path {
        ServerConfig::from_file(&path)
            .map_err(|e| ServerError::Config(format!("Failed to load config: {}", e)))?
    } else {
        ServerConfig::default()
    };

    KilnServer::new(config)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
