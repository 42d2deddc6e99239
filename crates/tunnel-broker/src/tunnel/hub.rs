//! Session ownership: at most one worker is connected at a time.

use crate::domain::error::{HandoffError, SessionError};
use bytes::Bytes;
use http::Request;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

struct ActiveSession {
    id: u64,
    outbound: mpsc::Sender<Request<Bytes>>,
}

/// Holds the outbound queue of the single active tunnel session.
pub struct TunnelHub {
    active: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl TunnelHub {
    /// Create a hub whose sessions buffer up to `queue_capacity` requests.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Claim the hub for a new session.
    ///
    /// Fails with [`SessionError::AlreadyActive`] while another lease is alive.
    pub fn claim(self: &Arc<Self>) -> Result<SessionLease, SessionError> {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            return Err(SessionError::AlreadyActive {
                session_id: current.id,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        *active = Some(ActiveSession { id, outbound: tx });
        drop(active);

        info!(session_id = id, "Tunnel session claimed");

        Ok(SessionLease {
            id,
            hub: Arc::clone(self),
            outbound: Some(rx),
        })
    }

    /// Queue `request` for the active session's send loop.
    ///
    /// Waits while the queue is full; callers bound this with their own timer.
    pub async fn submit(&self, request: Request<Bytes>) -> Result<(), HandoffError> {
        let sender = self
            .active
            .lock()
            .as_ref()
            .map(|session| session.outbound.clone())
            .ok_or(HandoffError::NoSession)?;

        sender
            .send(request)
            .await
            .map_err(|_| HandoffError::SessionClosed)
    }

    /// Whether a session currently holds the hub.
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Id of the active session, if any.
    pub fn active_session(&self) -> Option<u64> {
        self.active.lock().as_ref().map(|session| session.id)
    }

    fn release(&self, id: u64) {
        let mut active = self.active.lock();
        if active.as_ref().map(|session| session.id) == Some(id) {
            *active = None;
            info!(session_id = id, "Tunnel session released");
        } else {
            debug!(session_id = id, "Stale lease release ignored");
        }
    }
}

/// Proof of ownership of the hub. Dropping it frees the hub.
pub struct SessionLease {
    id: u64,
    hub: Arc<TunnelHub>,
    outbound: Option<mpsc::Receiver<Request<Bytes>>>,
}

impl SessionLease {
    /// Session id assigned at claim time.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Take the receiving end of the outbound queue. Only the first call
    /// returns it.
    pub fn take_outbound(&mut self) -> Option<mpsc::Receiver<Request<Bytes>>> {
        self.outbound.take()
    }

    /// Free the hub now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.hub.release(self.id);
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease").field("id", &self.id).finish()
    }
}
