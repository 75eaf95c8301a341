//! Subscription bookkeeping
//!
//! The registry is the single source of truth for "what is subscribed" on
//! one connection; no component re-derives subscription state from socket
//! events. Identity is a typed composite key, so re-subscribing with the
//! same parameters is idempotent. Requests made while the socket is not
//! open queue as pending and replay in FIFO order on open, then discard;
//! nothing is auto-replayed from the confirmed set after a reconnect.

use crate::chain::ChainId;
use crate::stream::connection::StreamConnection;
use crate::stream::wire::{unsubscribe_frame, SubscribeFrame};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

/// Where subscribe/unsubscribe frames go
///
/// Seam over [`StreamConnection`] so the registry can be exercised without
/// a socket.
pub trait FrameSink {
    fn is_open(&self) -> bool;
    fn send_frame(&self, frame: &Value);
    /// Ask the owner to open the socket (used when a subscribe queues)
    fn request_connect(&self);
}

impl FrameSink for StreamConnection {
    fn is_open(&self) -> bool {
        self.is_connected()
    }

    fn send_frame(&self, frame: &Value) {
        self.send_json(frame);
    }

    fn request_connect(&self) {
        self.connect();
    }
}

/// Deterministic composite identity of a subscription
///
/// A tagged union rather than a concatenated string, so keys of different
/// kinds can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    /// All positions for a wallet on one chain
    Positions { wallet: String, chain: ChainId },
    /// One wallet+token position
    Position {
        wallet: String,
        chain: ChainId,
        token: String,
    },
    /// Wallet transaction feed
    WalletTransactions { wallet: String, chain: ChainId },
    /// Pulse view of newly listed tokens; one view per connection,
    /// replaced wholesale by the server on re-subscribe
    PulseView { view: String },
}

impl SubscriptionKey {
    /// Wire `type` for the subscribe envelope
    pub fn feed_type(&self) -> &'static str {
        match self {
            Self::Positions { .. } => "positions",
            Self::Position { .. } => "position",
            Self::WalletTransactions { .. } => "wallet-transactions",
            Self::PulseView { .. } => "pulse-view",
        }
    }
}

/// A confirmed (sent) subscription record
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub key: SubscriptionKey,
    pub created_at: DateTime<Utc>,
}

/// A request queued because the socket was not open
struct PendingSubscription {
    id: String,
    key: SubscriptionKey,
    payload: Value,
}

/// Maps logical subscriptions to connection-level subscription ids
pub struct SubscriptionRegistry {
    api_key: String,
    active: DashMap<SubscriptionKey, Subscription>,
    pending: Mutex<VecDeque<PendingSubscription>>,
}

impl SubscriptionRegistry {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            active: DashMap::new(),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Subscribe with a deterministic composite key
    ///
    /// Idempotent per key: an existing subscription's id is returned
    /// without re-sending. Otherwise the subscribe frame is sent
    /// immediately when the sink is open, or queued (and a connect
    /// requested) when it is not.
    pub fn subscribe(&self, sink: &dyn FrameSink, key: SubscriptionKey, payload: Value) -> String {
        if let Some(existing) = self.active.get(&key) {
            return existing.id.clone();
        }
        // A pending request for the same key is also idempotent
        {
            let pending = self.pending.lock();
            if let Some(queued) = pending.iter().find(|p| p.key == key) {
                return queued.id.clone();
            }
        }

        let id = format!("sub-{}", Uuid::new_v4());
        if sink.is_open() {
            let frame = SubscribeFrame::new(key.feed_type(), &self.api_key, payload, &id);
            sink.send_frame(&frame.to_json());
            self.active.insert(
                key.clone(),
                Subscription {
                    id: id.clone(),
                    key,
                    created_at: Utc::now(),
                },
            );
        } else {
            debug!(id = %id, "socket not open, queueing subscription");
            self.pending.lock().push_back(PendingSubscription {
                id: id.clone(),
                key,
                payload,
            });
            sink.request_connect();
        }
        id
    }

    /// Remove the local record, then best-effort send an unsubscribe frame
    ///
    /// Idempotent: a second call for the same id finds no record and sends
    /// nothing. The server's "subscription not found" reply to the
    /// best-effort frame is handled as benign by the owning service.
    pub fn unsubscribe(&self, sink: &dyn FrameSink, id: &str) {
        // Drop a queued request that was never sent
        self.pending.lock().retain(|p| p.id != id);

        let key = self
            .active
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.key().clone());
        let Some(key) = key else {
            return;
        };
        self.active.remove(&key);
        if sink.is_open() {
            sink.send_frame(&unsubscribe_frame(&self.api_key, Some(id)));
        }
    }

    /// Replay queued requests in FIFO order after the socket opens
    ///
    /// Only never-yet-sent requests replay; confirmed subscriptions are the
    /// caller's responsibility after a reconnect.
    pub fn flush_pending(&self, sink: &dyn FrameSink) {
        let drained: Vec<PendingSubscription> = {
            let mut pending = self.pending.lock();
            pending.drain(..).collect()
        };
        for request in drained {
            let frame = SubscribeFrame::new(
                request.key.feed_type(),
                &self.api_key,
                request.payload,
                &request.id,
            );
            sink.send_frame(&frame.to_json());
            self.active.insert(
                request.key.clone(),
                Subscription {
                    id: request.id,
                    key: request.key,
                    created_at: Utc::now(),
                },
            );
        }
    }

    /// Drop confirmed records without sending frames
    ///
    /// Called when the socket drops: the server's subscription state is
    /// gone, so keeping confirmed records would make a caller's re-issue
    /// a silent no-op. Pending (never-sent) requests survive to replay.
    pub fn clear_active(&self) {
        self.active.clear();
    }

    /// Drop all records without sending frames (deliberate disconnect)
    pub fn clear(&self) {
        self.active.clear();
        self.pending.lock().clear();
    }

    pub fn lookup(&self, key: &SubscriptionKey) -> Option<Subscription> {
        self.active.get(key).map(|entry| entry.value().clone())
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}
