//! Web layer
//!
//! Exposes the trigger endpoint and the health probe. Handlers are
//! thin: resolution, guard acquisition and dispatch live in the jobs
//! module; the web layer only maps them onto the HTTP contract.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::jobs::{ExecutionGuard, JobRegistry, JobRunner};

pub mod api;

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(
        config: &Config,
        registry: Arc<JobRegistry>,
        guard: ExecutionGuard,
        runner: Arc<JobRunner>,
    ) -> Result<Self> {
        let app = Self::create_router(AppState {
            registry,
            guard,
            runner,
            started_at: Utc::now(),
        });

        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;

        Ok(Self { app, addr })
    }

    /// Create the router with all routes and middleware
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(api::health))
            .route("/trigger_job", post(api::trigger_job))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Start the web server, draining connections on cancellation
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        info!("Web server listening on {}", self.addr);
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub guard: ExecutionGuard,
    pub runner: Arc<JobRunner>,
    pub started_at: DateTime<Utc>,
}
