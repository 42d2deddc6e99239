//! Inbound Ingress - one forward per inbound request.
//!
//! Mints the correlation token, tags the request, subscribes, then runs the
//! hand-off to the tunnel and the bounded wait concurrently. The slot is
//! unsubscribed once both finish, whatever happened.

use crate::domain::error::HandoffError;
use crate::registry::CorrelationRegistry;
use crate::tunnel::TunnelHub;
use bytes::Bytes;
use http::{Request, Response};
use shared_wire::CorrelationId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// How a forwarded request ended.
#[derive(Debug)]
pub enum IngressOutcome {
    /// The worker's response arrived within the window.
    Delivered(Response<Bytes>),
    /// Nothing arrived within the window.
    TimedOut,
    /// The request never reached the tunnel.
    Undeliverable(HandoffError),
    /// The session ended while the caller was waiting.
    Released,
}

impl IngressOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Forwards inbound requests through the tunnel and waits for their responses.
#[derive(Clone)]
pub struct Ingress {
    registry: Arc<CorrelationRegistry>,
    hub: Arc<TunnelHub>,
    timeout: Duration,
}

impl Ingress {
    pub fn new(registry: Arc<CorrelationRegistry>, hub: Arc<TunnelHub>, timeout: Duration) -> Self {
        Self {
            registry,
            hub,
            timeout,
        }
    }

    /// Wait window per request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Forward `request` under a fresh token.
    pub async fn forward(&self, request: Request<Bytes>) -> (CorrelationId, IngressOutcome) {
        let token = CorrelationId::new();
        let outcome = self.forward_as(token, request).await;
        (token, outcome)
    }

    /// Forward `request` under `token`, overwriting any `inlets-id` it carries.
    pub async fn forward_as(&self, token: CorrelationId, mut request: Request<Bytes>) -> IngressOutcome {
        token.inject(request.headers_mut());
        let slot = self.registry.subscribe(token);
        let deadline = Instant::now() + self.timeout;

        let handoff = async {
            let result = match timeout_at(deadline, self.hub.submit(request)).await {
                Ok(result) => result,
                Err(_) => Err(HandoffError::QueueFull),
            };
            if let Err(e) = &result {
                warn!(correlation_id = %token, error = %e, "Request not handed to tunnel");
                // Wakes the waiter below
                self.registry.unsubscribe(&token);
            }
            result
        };
        let wait = timeout_at(deadline, slot.recv());

        let (handoff, waited) = tokio::join!(handoff, wait);
        self.registry.unsubscribe(&token);

        let outcome = match (waited, handoff) {
            (Ok(Some(response)), _) => IngressOutcome::Delivered(response),
            (_, Err(e)) => IngressOutcome::Undeliverable(e),
            (Ok(None), Ok(())) => IngressOutcome::Released,
            (Err(_), Ok(())) => IngressOutcome::TimedOut,
        };

        match &outcome {
            IngressOutcome::Delivered(response) => debug!(
                correlation_id = %token,
                status = response.status().as_u16(),
                "Response delivered"
            ),
            other => debug!(correlation_id = %token, outcome = ?other, "No response"),
        }

        outcome
    }
}
