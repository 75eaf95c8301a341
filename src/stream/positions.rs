//! Position stream service
//!
//! Streams wallet position updates (balances and USD values) over one
//! connection shared with the pulse feed's endpoint. Updates are coalesced
//! by the batcher under a chain+token dedup key, so a burst of quotes for
//! the same token collapses to the latest one.

use crate::chain::ChainId;
use crate::config::StreamingConfig;
use crate::metrics::StreamMetrics;
use crate::stream::batcher::UpdateBatcher;
use crate::stream::connection::{ConnectionEvent, ConnectionState, StreamConnection};
use crate::stream::registry::{SubscriptionKey, SubscriptionRegistry};
use crate::stream::error::StreamError;
use crate::stream::wire::InboundFrame;
use crate::stream::ServiceEvent;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One position delta from the stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    #[serde(rename = "chainId")]
    pub chain: ChainId,
    pub token_address: String,
    #[serde(default)]
    pub wallet: Option<String>,
    /// Balance in base units, as a decimal string
    #[serde(default)]
    pub balance: Option<String>,
    #[serde(default)]
    pub value_usd: Option<f64>,
    /// Position closed; consumers drop it from their model
    #[serde(default)]
    pub removed: bool,
}

impl PositionUpdate {
    /// Coalescing key: later updates for the same chain+token replace
    /// earlier unflushed ones
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.chain, self.token_address.to_lowercase())
    }
}

/// Streams position updates for subscribed wallets
pub struct PositionStreamService {
    conn: Arc<StreamConnection>,
    registry: Arc<SubscriptionRegistry>,
    batcher: UpdateBatcher<String, PositionUpdate>,
    pump: JoinHandle<()>,
}

impl PositionStreamService {
    /// Create the service plus its batched-update and service-event
    /// receivers; no socket opens until the first subscribe or an explicit
    /// `connect()`
    pub fn new(
        config: &StreamingConfig,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<Vec<PositionUpdate>>,
        mpsc::UnboundedReceiver<ServiceEvent>,
    ) {
        let metrics = Arc::new(StreamMetrics::new());
        let (conn, conn_events) = StreamConnection::new(
            config.connection(&config.positions_ws_url),
            Arc::clone(&metrics),
        );
        let conn = Arc::new(conn);
        let registry = Arc::new(SubscriptionRegistry::new(config.api_key.clone()));
        let (batcher, updates_rx) =
            UpdateBatcher::new(config.batch_debounce(), config.batch_max_delay(), metrics);
        let (event_tx, events_rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(pump(
            conn_events,
            Arc::clone(&conn),
            Arc::clone(&registry),
            batcher.clone(),
            event_tx,
        ));

        (
            Self {
                conn,
                registry,
                batcher,
                pump,
            },
            updates_rx,
            events_rx,
        )
    }

    /// Subscribe to all positions of a wallet on one chain
    ///
    /// Idempotent per wallet+chain; returns the subscription id either way.
    pub fn subscribe_positions(&self, wallet: &str, chain: ChainId) -> String {
        let payload = json!({
            "wallet": wallet,
            "chains": [chain.to_string()],
        });
        self.registry.subscribe(
            self.conn.as_ref(),
            SubscriptionKey::Positions {
                wallet: wallet.to_string(),
                chain,
            },
            payload,
        )
    }

    /// Subscribe to a single wallet+token position
    pub fn subscribe_position(&self, wallet: &str, chain: ChainId, token: &str) -> String {
        let payload = json!({
            "wallet": wallet,
            "chain": chain.to_string(),
            "token": token,
        });
        self.registry.subscribe(
            self.conn.as_ref(),
            SubscriptionKey::Position {
                wallet: wallet.to_string(),
                chain,
                token: token.to_string(),
            },
            payload,
        )
    }

    /// Unsubscribe by id; idempotent
    pub fn unsubscribe(&self, id: &str) {
        self.registry.unsubscribe(self.conn.as_ref(), id);
    }

    /// Open the socket without subscribing (also used to retry after the
    /// reconnect ceiling)
    pub fn connect(&self) {
        self.conn.connect();
    }

    /// Tear down: flush pending updates, clear subscriptions, close the
    /// socket
    pub async fn shutdown(&self) {
        self.registry.clear();
        self.conn.disconnect().await;
        self.batcher.flush_sync();
        self.pump.abort();
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn state_watch(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.conn.state_watch()
    }

    pub fn metrics(&self) -> &StreamMetrics {
        self.conn.metrics()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.registry.active_len()
    }
}

async fn pump(
    mut conn_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    conn: Arc<StreamConnection>,
    registry: Arc<SubscriptionRegistry>,
    batcher: UpdateBatcher<String, PositionUpdate>,
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
            ConnectionEvent::Frame(frame) => route_frame(frame, &batcher, &event_tx),
            ConnectionEvent::Disconnected { will_retry } => {
                // Server-side subscription state is gone either way
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
    batcher: &UpdateBatcher<String, PositionUpdate>,
    event_tx: &mpsc::UnboundedSender<ServiceEvent>,
) {
    match frame {
        InboundFrame::Data { data } => {
            for item in data_items(data) {
                match serde_json::from_value::<PositionUpdate>(item) {
                    Ok(update) => batcher.add(update.dedup_key(), update),
                    Err(e) => warn!(error = %e, "dropping malformed position update"),
                }
            }
        }
        InboundFrame::Init { payload } => {
            // Position snapshots flow through the batcher like deltas
            let items = payload
                .get("positions")
                .cloned()
                .map(data_items)
                .unwrap_or_default();
            for item in items {
                match serde_json::from_value::<PositionUpdate>(item) {
                    Ok(update) => batcher.add(update.dedup_key(), update),
                    Err(e) => warn!(error = %e, "dropping malformed position in snapshot"),
                }
            }
        }
        InboundFrame::SubscribedAck { subscription_id } => {
            debug!(id = %subscription_id, "position subscription acknowledged");
        }
        err @ InboundFrame::Error { .. } => {
            if err.is_benign_unsubscribe_race() {
                debug!("unsubscribe raced a server-side wipe, ignoring");
            } else if let InboundFrame::Error { message, code, .. } = err {
                warn!(message = %message, ?code, "position stream server error");
                let _ = event_tx.send(ServiceEvent::ServerError(StreamError::Server {
                    message,
                    code,
                }));
            }
        }
        _ => {}
    }
}

/// A data frame may carry one update or an array of them
fn data_items(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        other => vec![other],
    }
}
