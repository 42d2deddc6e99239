//! Broker service - public router, tunnel upgrade and admin API.

use crate::domain::config::BrokerConfig;
use crate::domain::error::BrokerError;
use crate::ingress::{Ingress, IngressOutcome};
use crate::middleware::TracingLayer;
use crate::registry::CorrelationRegistry;
use crate::tunnel::{split_socket, TunnelHub, TunnelSession};
use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use shared_wire::{CorrelationId, CORRELATION_HEADER, MAX_HEADERS};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Inbound header budget: the forwarded copy also carries `inlets-id` and
/// `content-length`, and must still decode on the worker.
const MAX_INBOUND_HEADERS: usize = MAX_HEADERS - 2;

/// Broker service state
pub struct BrokerService {
    config: BrokerConfig,
    registry: Arc<CorrelationRegistry>,
    hub: Arc<TunnelHub>,
    ingress: Ingress,
}

impl BrokerService {
    /// Create a new broker service
    pub fn new(config: BrokerConfig) -> Result<Self, BrokerError> {
        config.validate()?;

        let registry = Arc::new(CorrelationRegistry::new());
        let hub = Arc::new(TunnelHub::new(config.tunnel.outbound_queue));
        let ingress = Ingress::new(
            Arc::clone(&registry),
            Arc::clone(&hub),
            config.ingress.timeout,
        );

        Ok(Self {
            config,
            registry,
            hub,
            ingress,
        })
    }

    /// Bind the configured addresses and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), BrokerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let public = bind(self.config.http_addr()).await?;
        let admin = if self.config.admin.enabled {
            Some(bind(self.config.admin_addr()).await?)
        } else {
            None
        };
        self.serve_on(public, admin, shutdown).await
    }

    /// Serve on already-bound listeners until `shutdown` resolves.
    pub async fn serve_on<F>(
        self,
        public: TcpListener,
        admin: Option<TcpListener>,
        shutdown: F,
    ) -> Result<(), BrokerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown.await;
            info!("Received shutdown signal");
            let _ = stop_tx.send(true);
        });

        let admin_handle = admin.map(|listener| {
            if let Ok(addr) = listener.local_addr() {
                info!(addr = %addr, "Starting Admin server");
            }
            let router = self.admin_router();
            let stop = stopped(stop_rx.clone());
            tokio::spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(stop)
                    .await
            })
        });

        if let Ok(addr) = public.local_addr() {
            info!(addr = %addr, tunnel_path = %self.config.tunnel.path, "Starting public server");
        }
        axum::serve(public, self.router())
            .with_graceful_shutdown(stopped(stop_rx))
            .await
            .map_err(BrokerError::Serve)?;

        if let Some(handle) = admin_handle {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Admin server error"),
                Err(e) => error!(error = %e, "Admin server task failed"),
            }
        }

        info!("Broker stopped");
        Ok(())
    }

    /// Public router: tunnel upgrade on the configured path, everything else
    /// forwarded through the tunnel.
    pub fn router(&self) -> Router {
        let state = AppState {
            ingress: self.ingress.clone(),
            registry: Arc::clone(&self.registry),
            hub: Arc::clone(&self.hub),
            max_body_size: self.config.ingress.max_body_size,
            max_frame_size: self.config.tunnel.max_frame_size,
        };

        Router::new()
            .route(
                &self.config.tunnel.path,
                get(tunnel_upgrade).fallback(handle_inbound),
            )
            .fallback(handle_inbound)
            .layer(TracingLayer::new())
            .with_state(state)
    }

    /// Admin router (localhost)
    pub fn admin_router(&self) -> Router {
        let registry = Arc::clone(&self.registry);
        let hub = Arc::clone(&self.hub);

        Router::new().route("/health", get(health_check)).route(
            "/pending",
            get(move || {
                let registry = Arc::clone(&registry);
                let hub = Arc::clone(&hub);
                async move {
                    Json(serde_json::json!({
                        "count": registry.pending_count(),
                        "session": hub.active_session(),
                        "stats": registry.stats().snapshot(),
                    }))
                }
            }),
        )
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<CorrelationRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn hub(&self) -> Arc<TunnelHub> {
        Arc::clone(&self.hub)
    }

    pub fn ingress(&self) -> &Ingress {
        &self.ingress
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, BrokerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| BrokerError::Bind { addr, source })
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    ingress: Ingress,
    registry: Arc<CorrelationRegistry>,
    hub: Arc<TunnelHub>,
    max_body_size: usize,
    max_frame_size: usize,
}

/// Worker handshake on the tunnel path.
async fn tunnel_upgrade(
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(ws) = ws else {
        return (StatusCode::UPGRADE_REQUIRED, "WebSocket upgrade required\n").into_response();
    };

    let lease = match state.hub.claim() {
        Ok(lease) => lease,
        Err(e) => {
            warn!(error = %e, "Rejecting worker, tunnel already connected");
            return (StatusCode::CONFLICT, "Tunnel already connected\n").into_response();
        }
    };

    info!(session_id = lease.id(), "Worker connecting");
    let registry = Arc::clone(&state.registry);
    let max_frame_size = state.max_frame_size;

    ws.on_upgrade(move |socket| async move {
        let session = TunnelSession::new(lease, registry, max_frame_size);
        let (sink, source) = split_socket(socket);
        session.run(sink, source).await;
    })
}

/// Any other inbound request: forward through the tunnel and wait.
async fn handle_inbound(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    if parts.headers.len() > MAX_INBOUND_HEADERS {
        warn!(
            headers = parts.headers.len(),
            limit = MAX_INBOUND_HEADERS,
            "Inbound header section rejected"
        );
        return (
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            "Request Header Fields Too Large\n",
        )
            .into_response();
    }

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, limit = state.max_body_size, "Inbound body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large\n").into_response();
        }
    };

    let (token, outcome) = state.ingress.forward(Request::from_parts(parts, body)).await;
    reply(token, outcome)
}

fn reply(token: CorrelationId, outcome: IngressOutcome) -> Response {
    let mut response = match outcome {
        IngressOutcome::Delivered(worker) => (worker.status(), "Done\n").into_response(),
        _ => (StatusCode::GATEWAY_TIMEOUT, "Timeout\n").into_response(),
    };
    response
        .headers_mut()
        .insert(CORRELATION_HEADER, token.header_value());
    response
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tunnel-broker",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
