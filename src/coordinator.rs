//! The single preview server per port.
//!
//! Whichever invocation binds the port first becomes the coordinator and owns
//! every session; later invocations find the port taken and talk to it over
//! the control API instead.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clients::{ClientError, ControlClient};
use crate::config::Config;
use crate::routes::create_routes;
use crate::services::MarkdownRenderer;
use crate::session::{Registry, WatchSettings};
use crate::AppState;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("preview server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Outcome of trying to own the port
pub enum Role {
    Coordinator(Coordinator),
    Client(ControlClient),
}

/// Try to become the coordinator for `config.port`; if another process
/// already holds the port, return a client for it instead.
pub async fn establish(config: &Config) -> Result<Role, CoordinatorError> {
    match Coordinator::bind(config).await {
        Ok(coordinator) => Ok(Role::Coordinator(coordinator)),
        Err(CoordinatorError::Bind { addr, source }) if source.kind() == ErrorKind::AddrInUse => {
            info!(%addr, "port already in use, acting as client of the running server");
            Ok(Role::Client(ControlClient::new(config.base_url())?))
        }
        Err(e) => Err(e),
    }
}

/// Build the application router
pub fn build_app(state: AppState) -> Router {
    create_routes(state)
}

pub struct Coordinator {
    listener: TcpListener,
    state: AppState,
}

impl Coordinator {
    /// Bind the configured address with a fresh registry
    pub async fn bind(config: &Config) -> Result<Self, CoordinatorError> {
        let addr = config.server_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| CoordinatorError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let registry = Registry::new(
            Arc::new(MarkdownRenderer),
            WatchSettings {
                debounce: config.debounce(),
            },
        );
        Ok(Self::with_listener(listener, registry))
    }

    /// Serve an already bound listener
    pub fn with_listener(listener: TcpListener, registry: Registry) -> Self {
        Self {
            listener,
            state: AppState::new(registry),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Registry {
        self.state.registry.clone()
    }

    /// Cancelling this token stops the serve loop
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Serve until shut down, then tear down every remaining session
    pub async fn serve(self) -> Result<(), CoordinatorError> {
        let Coordinator { listener, state } = self;
        let registry = state.registry.clone();
        let shutdown = state.shutdown.clone();

        if let Ok(addr) = listener.local_addr() {
            info!("🚀 Preview server running on http://{}", addr);
        }

        axum::serve(listener, build_app(state))
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(CoordinatorError::Serve)?;

        let removed = registry.remove_all().await;
        info!(removed, "preview server stopped");
        Ok(())
    }
}
