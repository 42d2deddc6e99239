//! Tunnel session: the send loop and the receive loop over one transport.

use crate::registry::{CorrelationRegistry, DeliveryOutcome};
use crate::tunnel::hub::SessionLease;
use bytes::Bytes;
use http::{Request, Response};
use shared_wire::{
    decode_response, encode_request, CorrelationId, FrameSink, FrameSource, TransportError,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The worker closed the transport.
    PeerClosed,
    /// Reading or writing the transport failed.
    TransportFailed(TransportError),
    /// The outbound queue was closed on the broker side.
    QueueClosed,
}

/// One connected worker.
///
/// Owns the lease on the hub for its whole lifetime; the hub becomes free
/// again when [`TunnelSession::run`] returns.
pub struct TunnelSession {
    lease: SessionLease,
    registry: Arc<CorrelationRegistry>,
    max_frame_size: usize,
}

impl TunnelSession {
    pub fn new(
        lease: SessionLease,
        registry: Arc<CorrelationRegistry>,
        max_frame_size: usize,
    ) -> Self {
        Self {
            lease,
            registry,
            max_frame_size,
        }
    }

    /// Session id from the hub.
    pub fn id(&self) -> u64 {
        self.lease.id()
    }

    /// Drive the session until either loop stops.
    ///
    /// Teardown closes the outbound queue and the sink, then wakes every
    /// pending waiter so callers see the timeout outcome at once.
    pub async fn run<S, R>(mut self, mut sink: S, mut source: R) -> SessionEnd
    where
        S: FrameSink,
        R: FrameSource,
    {
        let session_id = self.id();
        let Some(mut outbound) = self.lease.take_outbound() else {
            error!(session_id, "Outbound queue already taken");
            return SessionEnd::QueueClosed;
        };

        info!(session_id, "Tunnel session started");

        let end = tokio::select! {
            end = send_loop(session_id, &mut sink, &mut outbound) => end,
            end = self.receive_loop(&mut source) => end,
        };

        outbound.close();
        if let Err(e) = sink.close().await {
            debug!(session_id, error = %e, "Sink close failed");
        }
        let released = self.registry.release_all();

        match &end {
            SessionEnd::TransportFailed(e) => {
                warn!(session_id, error = %e, released, "Tunnel session failed")
            }
            _ => info!(session_id, reason = ?end, released, "Tunnel session ended"),
        }

        end
    }

    async fn receive_loop<R: FrameSource>(&self, source: &mut R) -> SessionEnd {
        let session_id = self.id();
        loop {
            let frame = match source.next_frame().await {
                None => return SessionEnd::PeerClosed,
                Some(Err(e)) => return SessionEnd::TransportFailed(e),
                Some(Ok(frame)) => frame,
            };

            if frame.len() > self.max_frame_size {
                warn!(
                    session_id,
                    size = frame.len(),
                    max = self.max_frame_size,
                    "Frame exceeds size limit, skipping"
                );
                continue;
            }

            match decode_response(&frame) {
                Ok(response) => self.dispatch(response),
                Err(e) => warn!(session_id, error = %e, "Malformed response frame, skipping"),
            }
        }
    }

    /// Route a decoded response to the caller subscribed under its token.
    fn dispatch(&self, response: Response<Bytes>) {
        let Some(token) = CorrelationId::from_headers(response.headers()) else {
            self.registry.stats().unmatched.fetch_add(1, Ordering::Relaxed);
            warn!(session_id = self.id(), "Response without correlation token, dropping");
            return;
        };

        let subscribers = self.registry.list();
        let considered = subscribers.len();
        let position = subscribers.iter().position(|candidate| *candidate == token);

        let outcome = self.registry.deliver(token, response);
        match outcome {
            DeliveryOutcome::Delivered => debug!(
                correlation_id = %token,
                considered,
                position,
                "Dispatched response"
            ),
            _ => debug!(
                correlation_id = %token,
                considered,
                matched = position.is_some(),
                outcome = outcome.as_str(),
                "Response not delivered"
            ),
        }
    }
}

async fn send_loop<S: FrameSink>(
    session_id: u64,
    sink: &mut S,
    outbound: &mut mpsc::Receiver<Request<Bytes>>,
) -> SessionEnd {
    while let Some(request) = outbound.recv().await {
        let frame = encode_request(&request);
        if let Some(token) = CorrelationId::from_headers(request.headers()) {
            debug!(session_id, correlation_id = %token, bytes = frame.len(), "Forwarding request");
        }
        if let Err(e) = sink.send_frame(frame).await {
            return SessionEnd::TransportFailed(e);
        }
    }
    SessionEnd::QueueClosed
}
