//! Frame transport ports.
//!
//! The broker and the worker only ever see whole binary frames. WebSocket
//! adapters live next to the code that owns the socket; this module holds the
//! ports and an in-memory duplex used by tests and embedded setups.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Writing half of a frame transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame.
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Close the transport. Further sends fail with [`TransportError::Closed`].
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Reading half of a frame transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame; `None` once the peer has closed the transport.
    async fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>>;
}

type FrameItem = Result<Bytes, TransportError>;

/// Writing half of an in-memory transport.
#[derive(Debug)]
pub struct MemorySink {
    tx: Option<mpsc::Sender<FrameItem>>,
}

impl MemorySink {
    /// Make the peer's next read fail with `error`.
    pub async fn fail(&mut self, error: TransportError) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(Err(error))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(Ok(frame)).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// Reading half of an in-memory transport.
#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::Receiver<FrameItem>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>> {
        self.rx.recv().await
    }
}

/// One end of an in-memory duplex transport.
#[derive(Debug)]
pub struct MemoryTransport {
    /// Frames written here arrive at the peer's source.
    pub sink: MemorySink,
    /// Frames the peer wrote.
    pub source: MemorySource,
}

impl MemoryTransport {
    /// Split into the writing and reading halves.
    pub fn split(self) -> (MemorySink, MemorySource) {
        (self.sink, self.source)
    }
}

/// Create a connected pair of in-memory transports.
///
/// `capacity` bounds the frames buffered in each direction.
pub fn memory_pair(capacity: usize) -> (MemoryTransport, MemoryTransport) {
    let (a_tx, a_rx) = mpsc::channel(capacity.max(1));
    let (b_tx, b_rx) = mpsc::channel(capacity.max(1));

    let a = MemoryTransport {
        sink: MemorySink { tx: Some(a_tx) },
        source: MemorySource { rx: b_rx },
    };
    let b = MemoryTransport {
        sink: MemorySink { tx: Some(b_tx) },
        source: MemorySource { rx: a_rx },
    };
    (a, b)
}
