//! Tunnel endpoint: session ownership, the per-session loops and the
//! WebSocket adapter.

pub mod hub;
pub mod session;
pub mod ws;

pub use hub::{SessionLease, TunnelHub};
pub use session::{SessionEnd, TunnelSession};
pub use ws::{split_socket, WsSink, WsSource};
