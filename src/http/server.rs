//! Client-facing listeners.
//!
//! # Responsibilities
//! - Create the Axum router that hands every request to the engine
//! - Wire up middleware (request ID, tracing)
//! - Serve plain HTTP and, when TLS is configured, HTTPS
//! - Stop accepting and drain on shutdown

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::pipeline::ExecutionEngine;

const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP(S) server for client traffic.
#[derive(Clone)]
pub struct GatewayServer {
    engine: ExecutionEngine,
}

impl GatewayServer {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self { engine }
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(gateway_handler)
            .with_state(self.engine.clone())
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Serve plain HTTP on `listener` until shutdown.
    pub async fn serve(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP listener started");

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!(address = %addr, "HTTP listener stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until shutdown.
    pub async fn serve_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown.wait().await;
            drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        tracing::info!(address = %addr, "HTTPS listener started");
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!(address = %addr, "HTTPS listener stopped");
        Ok(())
    }
}

async fn gateway_handler(
    State(engine): State<ExecutionEngine>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    engine.execute(request, client_addr).await
}
