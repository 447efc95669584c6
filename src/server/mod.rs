//! HTTP server
//!
//! Wires configuration into the shared state (rate limiter, upstream
//! clients), serves the router, and handles graceful shutdown.

pub mod auth;
pub mod rate_limit;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::airtable::AirtableClient;
use crate::config::Config;
use crate::workflow::n8n::N8nClient;
use crate::{Error, Result};
use self::rate_limit::FixedWindowLimiter;
use self::router::{AppState, create_router};

/// The bridge server.
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a server from configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let state = Arc::new(AppState {
            rate_limiter: FixedWindowLimiter::new(&self.config.rate_limit),
            n8n: N8nClient::new(self.config.n8n.clone()),
            airtable: AirtableClient::new(self.config.airtable.clone()),
            config: self.config,
        });

        let app = create_router(Arc::clone(&state));
        let listener = TcpListener::bind(addr).await?;

        info!(
            host = %state.config.server.host,
            port = state.config.server.port,
            "Listening"
        );
        if state.config.n8n.webhook_url.is_none() {
            warn!("N8N_WEBHOOK_URL is not set - executions will fail with ENV_MISSING");
        }
        if state.config.auth.app_password.is_none() {
            warn!("APP_PASSWORD is not set - all login attempts will be rejected");
        }
        if state.config.airtable.api_key.is_none() {
            warn!("Airtable is not configured - problem reports will fail with ENV_MISSING");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Server shutdown complete");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
