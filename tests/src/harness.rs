//! Fixtures shared by the integration flows.

use axum::body::Body;
use axum::response::Response;
use http::Request;
use shared_wire::{memory_pair, MemoryTransport, TransportError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tunnel_broker::{BrokerConfig, BrokerService, SessionEnd, TunnelSession};
use tunnel_worker::{RelaySummary, WorkerRelay};

/// Broker with a short ingress window and the admin server disabled.
pub fn broker(timeout: Duration) -> BrokerService {
    let mut config = BrokerConfig::default();
    config.ingress.timeout = timeout;
    config.admin.enabled = false;
    BrokerService::new(config).expect("test config is valid")
}

/// Claim the broker's hub and run a session over an in-memory transport.
///
/// Returns the running session and the worker's end of the transport.
pub fn attach_memory_worker(service: &BrokerService) -> (JoinHandle<SessionEnd>, MemoryTransport) {
    let lease = service.hub().claim().expect("hub is free");
    let (broker_end, worker_end) = memory_pair(64);
    let (sink, source) = broker_end.split();

    let session = TunnelSession::new(
        lease,
        service.registry(),
        service.config().tunnel.max_frame_size,
    );
    (tokio::spawn(session.run(sink, source)), worker_end)
}

/// Run a real [`WorkerRelay`] on the worker's end of the transport.
pub fn spawn_relay(
    worker_end: MemoryTransport,
) -> JoinHandle<Result<RelaySummary, TransportError>> {
    let (sink, source) = worker_end.split();
    tokio::spawn(async move { WorkerRelay::new().run(sink, source).await })
}

/// Inbound request with an empty body.
pub fn inbound(method: &str, path: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .expect("valid request")
}

/// Collect a response body as text.
pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
