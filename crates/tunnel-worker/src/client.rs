//! WebSocket client side of the tunnel.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use shared_wire::{FrameSink, FrameSource, TransportError};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors establishing the tunnel.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to connect to {url}: {source}")]
    Handshake {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

/// Writing half of the worker's socket.
pub struct TungsteniteSink {
    inner: SplitSink<Socket, Message>,
}

/// Reading half of the worker's socket.
pub struct TungsteniteSource {
    inner: SplitStream<Socket>,
}

/// Dial the broker's tunnel endpoint and split the socket into frame halves.
pub async fn connect(url: &str) -> Result<(TungsteniteSink, TungsteniteSource), ConnectError> {
    let (socket, response) = connect_async(url)
        .await
        .map_err(|source| ConnectError::Handshake {
            url: url.to_string(),
            source,
        })?;

    info!(url, status = response.status().as_u16(), "Tunnel connected");

    let (sink, stream) = socket.split();
    Ok((
        TungsteniteSink { inner: sink },
        TungsteniteSource { inner: stream },
    ))
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.inner
            .send(Message::Binary(frame))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[async_trait]
impl FrameSource for TungsteniteSource {
    async fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(data)),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Broker sent close");
                    return None;
                }
                Ok(Message::Text(text)) => {
                    debug!(len = text.len(), "Ignoring text message on tunnel");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
    }
}
