//! Pulse stream service
//!
//! Streams the newly-listed / trending token feed for one named view per
//! connection. An `init` snapshot is delivered immediately and never
//! batched; incremental token updates coalesce per view+token. The feed
//! can be paused while a screen is hidden: frames are dropped before the
//! batcher while the socket and subscription stay warm.

use crate::config::StreamingConfig;
use crate::metrics::StreamMetrics;
use crate::stream::batcher::UpdateBatcher;
use crate::stream::connection::{ConnectionEvent, ConnectionState, StreamConnection};
use crate::stream::registry::{SubscriptionKey, SubscriptionRegistry};
use crate::stream::error::StreamError;
use crate::stream::wire::InboundFrame;
use crate::stream::ServiceEvent;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How a pulse token changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseUpdateKind {
    New,
    Update,
    Remove,
}

/// One incremental change to a pulse view
#[derive(Debug, Clone, PartialEq)]
pub struct PulseUpdate {
    pub view: String,
    /// Token identity within the view (its address)
    pub token_key: String,
    pub kind: PulseUpdateKind,
    /// Raw token object as sent by the server
    pub token: Value,
}

impl PulseUpdate {
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.view, self.token_key)
    }
}

/// Consumer-facing pulse stream output
#[derive(Debug, Clone, PartialEq)]
pub enum PulseOutput {
    /// Full view snapshot; arrives on subscribe and replaces local state
    /// wholesale, bypassing the batcher
    Snapshot(Value),
    /// Coalesced incremental updates
    Updates(Vec<PulseUpdate>),
}

/// Streams one pulse view of newly listed tokens
pub struct PulseStreamService {
    conn: Arc<StreamConnection>,
    registry: Arc<SubscriptionRegistry>,
    batcher: UpdateBatcher<String, PulseUpdate>,
    paused: Arc<AtomicBool>,
    current: Mutex<Option<String>>,
    pump: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl PulseStreamService {
    /// Create the service plus its output and service-event receivers
    pub fn new(
        config: &StreamingConfig,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<PulseOutput>,
        mpsc::UnboundedReceiver<ServiceEvent>,
    ) {
        let metrics = Arc::new(StreamMetrics::new());
        let (conn, conn_events) = StreamConnection::new(
            config.connection(&config.positions_ws_url),
            Arc::clone(&metrics),
        );
        let conn = Arc::new(conn);
        let registry = Arc::new(SubscriptionRegistry::new(config.api_key.clone()));
        let (batcher, mut batch_rx) =
            UpdateBatcher::new(config.batch_debounce(), config.batch_max_delay(), metrics);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, events_rx) = mpsc::unbounded_channel();
        let paused = Arc::new(AtomicBool::new(false));

        // Wrap flushed batches into the shared output channel
        let forwarder = {
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                while let Some(batch) = batch_rx.recv().await {
                    if out_tx.send(PulseOutput::Updates(batch)).is_err() {
                        break;
                    }
                }
            })
        };

        let pump = tokio::spawn(pump(
            conn_events,
            Arc::clone(&conn),
            Arc::clone(&registry),
            batcher.clone(),
            Arc::clone(&paused),
            out_tx,
            event_tx,
        ));

        (
            Self {
                conn,
                registry,
                batcher,
                paused,
                current: Mutex::new(None),
                pump,
                forwarder,
            },
            out_rx,
            events_rx,
        )
    }

    /// Subscribe to a named view, replacing any previous one
    ///
    /// The server keeps one pulse view per connection and replaces it
    /// wholesale, so the previous subscription is unsubscribed and pending
    /// unflushed updates for the old view are discarded. Returns the new
    /// subscription id.
    pub fn set_view(&self, view: &str, filters: Value) -> String {
        let mut current = self.current.lock();
        if let Some(old) = current.take() {
            self.registry.unsubscribe(self.conn.as_ref(), &old);
        }
        self.batcher.clear();

        let mut payload = match filters {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => json!({ "filters": other }),
        };
        if let Value::Object(map) = &mut payload {
            map.insert("viewName".to_string(), Value::String(view.to_string()));
        }
        let id = self.registry.subscribe(
            self.conn.as_ref(),
            SubscriptionKey::PulseView {
                view: view.to_string(),
            },
            payload,
        );
        *current = Some(id.clone());
        id
    }

    /// Stop the current view, if any
    pub fn clear_view(&self) {
        let mut current = self.current.lock();
        if let Some(old) = current.take() {
            self.registry.unsubscribe(self.conn.as_ref(), &old);
        }
        self.batcher.clear();
    }

    /// Drop inbound data frames without touching the socket or the
    /// subscription; used while the consuming screen is hidden
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    /// Resume delivery; nothing dropped while paused is replayed
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn connect(&self) {
        self.conn.connect();
    }

    pub async fn shutdown(&self) {
        self.registry.clear();
        self.conn.disconnect().await;
        self.batcher.flush_sync();
        self.pump.abort();
        self.forwarder.abort();
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn metrics(&self) -> &StreamMetrics {
        self.conn.metrics()
    }
}

#[allow(clippy::too_many_arguments)]
async fn pump(
    mut conn_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    conn: Arc<StreamConnection>,
    registry: Arc<SubscriptionRegistry>,
    batcher: UpdateBatcher<String, PulseUpdate>,
    paused: Arc<AtomicBool>,
    out_tx: mpsc::UnboundedSender<PulseOutput>,
    event_tx: mpsc::UnboundedSender<ServiceEvent>,
) {
    let mut was_connected = false;
    while let Some(event) = conn_events.recv().await {
        match event {
            ConnectionEvent::Connected => {
                registry.flush_pending(conn.as_ref());
                if was_connected {
                    let _ = event_tx.send(ServiceEvent::Reconnected);
                }
                was_connected = true;
            }
            ConnectionEvent::Frame(frame) => {
                route_frame(
                    frame,
                    paused.load(Ordering::Relaxed),
                    &batcher,
                    &out_tx,
                    &event_tx,
                );
            }
            ConnectionEvent::Disconnected { will_retry } => {
                registry.clear_active();
                if !will_retry {
                    batcher.flush_sync();
                }
            }
            ConnectionEvent::ReconnectsExhausted { attempts } => {
                let _ = event_tx.send(ServiceEvent::ConnectionLost(
                    StreamError::ReconnectLimitExceeded(attempts),
                ));
            }
        }
    }
}

fn route_frame(
    frame: InboundFrame,
    paused: bool,
    batcher: &UpdateBatcher<String, PulseUpdate>,
    out_tx: &mpsc::UnboundedSender<PulseOutput>,
    event_tx: &mpsc::UnboundedSender<ServiceEvent>,
) {
    match frame {
        InboundFrame::Init { payload } => {
            if paused {
                debug!("paused, dropping pulse snapshot");
                return;
            }
            // Snapshots replace state wholesale; batching one would let
            // stale deltas overtake it
            let _ = out_tx.send(PulseOutput::Snapshot(payload));
        }
        InboundFrame::NewToken { payload } => {
            add_update(PulseUpdateKind::New, payload, paused, batcher);
        }
        InboundFrame::UpdateToken { payload } => {
            add_update(PulseUpdateKind::Update, payload, paused, batcher);
        }
        InboundFrame::RemoveToken { payload } => {
            add_update(PulseUpdateKind::Remove, payload, paused, batcher);
        }
        InboundFrame::SubscribedAck { subscription_id } => {
            debug!(id = %subscription_id, "pulse subscription acknowledged");
        }
        err @ InboundFrame::Error { .. } => {
            if err.is_benign_unsubscribe_race() {
                debug!("unsubscribe raced a server-side wipe, ignoring");
            } else if let InboundFrame::Error { message, code, .. } = err {
                warn!(message = %message, ?code, "pulse stream server error");
                let _ = event_tx.send(ServiceEvent::ServerError(StreamError::Server {
                    message,
                    code,
                }));
            }
        }
        _ => {}
    }
}

fn add_update(
    kind: PulseUpdateKind,
    payload: Value,
    paused: bool,
    batcher: &UpdateBatcher<String, PulseUpdate>,
) {
    if paused {
        return;
    }
    match parse_update(kind, payload) {
        Some(update) => batcher.add(update.dedup_key(), update),
        None => warn!(?kind, "dropping malformed pulse update"),
    }
}

fn parse_update(kind: PulseUpdateKind, payload: Value) -> Option<PulseUpdate> {
    let view = payload
        .get("viewName")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let token = payload.get("token").cloned().unwrap_or(Value::Null);
    let token_key = token
        .get("address")
        .and_then(|v| v.as_str())
        .or_else(|| payload.get("tokenKey").and_then(|v| v.as_str()))?
        .to_string();
    Some(PulseUpdate {
        view,
        token_key,
        kind,
        token,
    })
}
