//! Worker relay: answer each forwarded request on the same transport.

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use shared_wire::{
    decode_request, encode_response, CorrelationId, FrameSink, FrameSource, TransportError,
};
use tracing::{debug, info, warn};

/// Counters for one relay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Requests answered
    pub answered: u64,
    /// Frames that did not decode as a request
    pub malformed: u64,
}

/// Echoes the correlation token back with a success status.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerRelay;

impl WorkerRelay {
    pub fn new() -> Self {
        Self
    }

    /// Build the response for a decoded request.
    pub fn respond(&self, request: &Request<Bytes>) -> Response<Bytes> {
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = StatusCode::OK;
        if let Some(token) = CorrelationId::from_headers(request.headers()) {
            token.inject(response.headers_mut());
        }
        response
    }

    /// Decode one frame and encode the reply. `None` for frames that are not
    /// a well-formed request.
    pub fn handle_frame(&self, frame: &[u8]) -> Option<Bytes> {
        let request = match decode_request(frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, size = frame.len(), "Malformed request frame, skipping");
                return None;
            }
        };

        let token = CorrelationId::from_headers(request.headers());
        debug!(
            correlation_id = token.map(|t| t.to_string()).as_deref().unwrap_or("-"),
            method = %request.method(),
            path = %request.uri().path(),
            "Recv"
        );

        Some(encode_response(&self.respond(&request)))
    }

    /// Serve requests until the broker closes the transport.
    pub async fn run<S, R>(&self, mut sink: S, mut source: R) -> Result<RelaySummary, TransportError>
    where
        S: FrameSink,
        R: FrameSource,
    {
        let mut summary = RelaySummary::default();

        while let Some(frame) = source.next_frame().await {
            let frame = frame?;
            let Some(reply) = self.handle_frame(&frame) else {
                summary.malformed += 1;
                continue;
            };
            sink.send_frame(reply).await?;
            summary.answered += 1;
        }

        info!(
            answered = summary.answered,
            malformed = summary.malformed,
            "Broker closed the tunnel"
        );
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Sink close failed");
        }
        Ok(summary)
    }
}
