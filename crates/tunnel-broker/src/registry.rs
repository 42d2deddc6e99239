//! Correlation Registry - token to single-use delivery slot.
//!
//! Bridges the receive loop of the tunnel session to the inbound callers
//! waiting on their responses.
//!
//! Flow:
//! 1. Ingress mints a [`CorrelationId`] and calls `subscribe()`
//! 2. The request is forwarded to the worker carrying that token
//! 3. The receive loop decodes the worker's response and calls `deliver()`
//! 4. Ingress awaits its [`DeliverySlot`] (bounded by its own timer)
//! 5. Ingress calls `unsubscribe()` whatever the outcome
//!
//! The map lives under one `parking_lot::RwLock` (writer-preferring). The
//! hand-off into a slot happens after the lock is released, and a slot's
//! `closed` flag is readable without the lock, so a delivery racing an
//! unsubscribe never blocks and never delivers twice.

use bytes::Bytes;
use http::Response;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use shared_wire::CorrelationId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Result of a single `deliver()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handed to the waiting caller.
    Delivered,
    /// No slot registered for the token.
    NoSubscriber,
    /// The slot was closed (caller gave up) before the hand-off.
    Closed,
    /// The slot already received its one value.
    AlreadyDelivered,
}

impl DeliveryOutcome {
    /// Short label for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::NoSubscriber => "no_subscriber",
            Self::Closed => "closed",
            Self::AlreadyDelivered => "already_delivered",
        }
    }
}

struct Slot {
    sender: Mutex<Option<oneshot::Sender<Response<Bytes>>>>,
    closed: AtomicBool,
}

impl Slot {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Dropping the sender wakes the receiver with `None`
        self.sender.lock().take();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Receiving half of a delivery slot, held by the waiting caller.
#[derive(Debug)]
pub struct DeliverySlot {
    token: CorrelationId,
    receiver: oneshot::Receiver<Response<Bytes>>,
}

impl DeliverySlot {
    /// Token this slot was registered under.
    pub fn token(&self) -> CorrelationId {
        self.token
    }

    /// Wait for the response.
    ///
    /// `None` once the slot is closed without a value (unsubscribed or
    /// released at session teardown).
    pub async fn recv(self) -> Option<Response<Bytes>> {
        self.receiver.await.ok()
    }
}

/// Registry counters.
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Slots created
    pub subscribed: AtomicU64,
    /// Responses handed to a waiting caller
    pub delivered: AtomicU64,
    /// Responses with no registered token
    pub unmatched: AtomicU64,
    /// Responses dropped because the slot had closed
    pub dropped_closed: AtomicU64,
    /// Second responses for an already-filled slot
    pub duplicates: AtomicU64,
    /// Slots removed by their caller
    pub unsubscribed: AtomicU64,
    /// Slots released at session teardown
    pub released: AtomicU64,
}

/// Point-in-time copy of [`RegistryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStatsSnapshot {
    pub subscribed: u64,
    pub delivered: u64,
    pub unmatched: u64,
    pub dropped_closed: u64,
    pub duplicates: u64,
    pub unsubscribed: u64,
    pub released: u64,
}

impl RegistryStats {
    /// Read every counter.
    pub fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            subscribed: self.subscribed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            dropped_closed: self.dropped_closed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            unsubscribed: self.unsubscribed.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }
}

/// Concurrency-safe map from correlation token to delivery slot.
#[derive(Default)]
pub struct CorrelationRegistry {
    slots: RwLock<HashMap<CorrelationId, Arc<Slot>>>,
    stats: RegistryStats,
}

impl CorrelationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot for `token`.
    ///
    /// Re-subscribing a live token replaces its slot; the previous waiter is
    /// woken with no value.
    pub fn subscribe(&self, token: CorrelationId) -> DeliverySlot {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Slot {
            sender: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
        });

        let previous = self.slots.write().insert(token, slot);
        if let Some(previous) = previous {
            warn!(correlation_id = %token, "Token subscribed twice, replacing slot");
            previous.close();
        }
        self.stats.subscribed.fetch_add(1, Ordering::Relaxed);

        debug!(correlation_id = %token, "Subscribed");

        DeliverySlot {
            token,
            receiver: rx,
        }
    }

    /// Snapshot of the registered tokens, in no particular order.
    pub fn list(&self) -> Vec<CorrelationId> {
        self.slots.read().keys().copied().collect()
    }

    /// Hand `response` to the slot registered for `token`.
    ///
    /// Never blocks: the slot is looked up under the read lock, the lock is
    /// dropped, and the single-use sender is taken.
    pub fn deliver(&self, token: CorrelationId, response: Response<Bytes>) -> DeliveryOutcome {
        let slot = self.slots.read().get(&token).cloned();

        let Some(slot) = slot else {
            self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %token, "No subscriber for response");
            return DeliveryOutcome::NoSubscriber;
        };

        if slot.is_closed() {
            self.stats.dropped_closed.fetch_add(1, Ordering::Relaxed);
            warn!(correlation_id = %token, "Slot closed, dropping response");
            return DeliveryOutcome::Closed;
        }

        let Some(sender) = slot.sender.lock().take() else {
            // Either already filled, or closed between the flag check and here
            if slot.is_closed() {
                self.stats.dropped_closed.fetch_add(1, Ordering::Relaxed);
                warn!(correlation_id = %token, "Slot closed, dropping response");
                return DeliveryOutcome::Closed;
            }
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            warn!(correlation_id = %token, "Duplicate response for token");
            return DeliveryOutcome::AlreadyDelivered;
        };

        match sender.send(response) {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %token, "Delivered response");
                DeliveryOutcome::Delivered
            }
            Err(_) => {
                // Receiver dropped: the caller is already gone
                self.stats.dropped_closed.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %token, "Waiter gone, dropping response");
                DeliveryOutcome::Closed
            }
        }
    }

    /// Close and remove the slot for `token`. Returns whether one existed.
    pub fn unsubscribe(&self, token: &CorrelationId) -> bool {
        let removed = self.slots.write().remove(token);
        match removed {
            Some(slot) => {
                slot.close();
                self.stats.unsubscribed.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %token, "Unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Close every slot. Waiters complete immediately with no value.
    ///
    /// Returns the number of slots released.
    pub fn release_all(&self) -> usize {
        let drained: Vec<Arc<Slot>> = {
            let mut slots = self.slots.write();
            slots.drain().map(|(_, slot)| slot).collect()
        };
        for slot in &drained {
            slot.close();
        }
        let count = drained.len();
        self.stats.released.fetch_add(count as u64, Ordering::Relaxed);
        if count > 0 {
            debug!(released = count, "Released pending slots");
        }
        count
    }

    /// Whether `token` currently has a slot.
    pub fn is_subscribed(&self, token: &CorrelationId) -> bool {
        self.slots.read().contains_key(token)
    }

    /// Number of registered slots.
    pub fn pending_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Get statistics
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}
