//! # HTTP Server
//!
//! Binds the dashboard routes to a listener.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::routes::{dashboard_routes, AppState};
use crate::config::Config;

/// Largest accepted CSV upload.
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// HTTP server for the dashboard
pub struct Dashboard {
    addr: String,
    router: Router,
}

impl Dashboard {
    /// Creates a server for the given configuration
    pub fn new(config: &Config) -> Self {
        let state = Arc::new(AppState::new(config));
        Self {
            addr: config.server.socket_addr(),
            router: Self::build_router(state),
        }
    }

    /// Builds the router with tracing and the upload size limit applied
    pub fn build_router(state: Arc<AppState>) -> Router {
        dashboard_routes()
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> &str {
        &self.addr
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serves until the process exits
    pub async fn start(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr.as_str()).await?;
        info!("Dashboard available at http://{}", listener.local_addr()?);
        axum::serve(listener, self.router).await
    }
}
