//! HTTP server: the WebSocket endpoint plus the static viewer UI, all behind
//! the shared credential.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, timeout::TimeoutLayer};

use crate::auth::{require_basic_auth, Credentials};
use crate::config::ServerConfig;
use crate::gateway::{ws_handler, GatewayState};
use crate::hub::Hub;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

/// Builds the router.
///
/// `/ws` upgrades to a subscriber connection; every other path is served from
/// the static directory and answers `408` past the request timeout. The
/// upgraded connection is long-lived and bounded per frame by the gateway
/// instead. The credential gate covers both.
pub fn build_router(
    hub: Arc<Hub>,
    credentials: Arc<Credentials>,
    config: &ServerConfig,
) -> Router {
    let assets: Router = Router::new()
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(TimeoutLayer::new(config.request_timeout()));

    let state = GatewayState {
        hub,
        write_timeout: config.write_timeout(),
    };

    Router::new()
        .route("/ws", get(ws_handler))
        .fallback_service(assets)
        .layer(middleware::from_fn_with_state(credentials, require_basic_auth))
        .with_state(state)
}

/// A bound, not yet running, HTTP server.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    router: Router,
}

impl Server {
    /// Binds the configured address.
    pub async fn bind(
        config: &ServerConfig,
        hub: Arc<Hub>,
        credentials: Arc<Credentials>,
    ) -> Result<Self, ServerError> {
        let address = config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind { address, source })?;

        Ok(Server {
            listener,
            router: build_router(hub, credentials, config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves requests until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(address) = self.local_addr() {
            tracing::info!(%address, "server listening");
        }

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)?;

        tracing::info!("server stopped");
        Ok(())
    }
}
