//! Frame transport over the upgraded axum WebSocket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use shared_wire::{FrameSink, FrameSource, TransportError};
use tracing::debug;

/// Writing half: one binary message per frame.
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

/// Reading half: yields binary payloads, ends on close.
pub struct WsSource {
    inner: SplitStream<WebSocket>,
}

/// Split an upgraded socket into frame transport halves.
pub fn split_socket(socket: WebSocket) -> (WsSink, WsSource) {
    let (sink, stream) = socket.split();
    (WsSink { inner: sink }, WsSource { inner: stream })
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.inner
            .send(Message::Binary(frame.to_vec()))
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
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<Bytes, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Worker sent close");
                    return None;
                }
                Ok(Message::Text(text)) => {
                    debug!(len = text.len(), "Ignoring text message on tunnel");
                }
                // Pings are answered by the socket itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
    }
}
