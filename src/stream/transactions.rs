//! Wallet transaction stream service
//!
//! EVM and Solana transaction feeds live on separate endpoints, so this
//! service runs two independent connections and routes each subscription
//! by chain family. Both lanes share one batcher keyed by chain+hash and
//! one consumer-facing update channel.

use crate::chain::{ChainFamily, ChainId};
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

/// One transaction observed for a subscribed wallet
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    /// EVM tx hash or Solana signature
    #[serde(alias = "txHash", alias = "signature")]
    pub hash: String,
    #[serde(rename = "chainId")]
    pub chain: ChainId,
    #[serde(default)]
    pub wallet: Option<String>,
    /// Server-reported status (`pending`, `confirmed`, `failed`)
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl TransactionUpdate {
    /// Later frames for the same transaction (status changes) replace
    /// earlier unflushed ones
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.chain, self.hash)
    }
}

struct Lane {
    conn: Arc<StreamConnection>,
    registry: Arc<SubscriptionRegistry>,
    pump: JoinHandle<()>,
}

impl Lane {
    fn new(
        config: &StreamingConfig,
        url: &str,
        family: ChainFamily,
        metrics: Arc<StreamMetrics>,
        batcher: UpdateBatcher<String, TransactionUpdate>,
        event_tx: mpsc::UnboundedSender<(ChainFamily, ServiceEvent)>,
    ) -> Self {
        let (conn, conn_events) = StreamConnection::new(config.connection(url), metrics);
        let conn = Arc::new(conn);
        let registry = Arc::new(SubscriptionRegistry::new(config.api_key.clone()));
        let pump = tokio::spawn(pump(
            conn_events,
            Arc::clone(&conn),
            Arc::clone(&registry),
            batcher,
            family,
            event_tx,
        ));
        Self {
            conn,
            registry,
            pump,
        }
    }

    async fn shutdown(&self) {
        self.registry.clear();
        self.conn.disconnect().await;
        self.pump.abort();
    }
}

/// Streams confirmed and pending transactions for subscribed wallets
pub struct TransactionStreamService {
    evm: Lane,
    solana: Lane,
    batcher: UpdateBatcher<String, TransactionUpdate>,
    metrics: Arc<StreamMetrics>,
}

impl TransactionStreamService {
    /// Create the service plus its batched-update and per-family
    /// service-event receivers
    pub fn new(
        config: &StreamingConfig,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<Vec<TransactionUpdate>>,
        mpsc::UnboundedReceiver<(ChainFamily, ServiceEvent)>,
    ) {
        // Both lanes and the batcher report into one set of counters
        let metrics = Arc::new(StreamMetrics::new());
        let (batcher, updates_rx) = UpdateBatcher::new(
            config.batch_debounce(),
            config.batch_max_delay(),
            Arc::clone(&metrics),
        );
        let (event_tx, events_rx) = mpsc::unbounded_channel();

        let evm = Lane::new(
            config,
            &config.evm_transactions_ws_url,
            ChainFamily::Evm,
            Arc::clone(&metrics),
            batcher.clone(),
            event_tx.clone(),
        );
        let solana = Lane::new(
            config,
            &config.solana_transactions_ws_url,
            ChainFamily::Solana,
            Arc::clone(&metrics),
            batcher.clone(),
            event_tx,
        );

        (
            Self {
                evm,
                solana,
                batcher,
                metrics,
            },
            updates_rx,
            events_rx,
        )
    }

    fn lane(&self, family: ChainFamily) -> &Lane {
        match family {
            ChainFamily::Evm => &self.evm,
            ChainFamily::Solana => &self.solana,
        }
    }

    /// Subscribe to a wallet's transactions on one chain
    ///
    /// Routed to the EVM or Solana connection by the chain's family;
    /// idempotent per wallet+chain.
    pub fn subscribe_wallet(&self, wallet: &str, chain: ChainId) -> String {
        let lane = self.lane(chain.family());
        let payload = json!({
            "wallet": wallet,
            "chain": chain.to_string(),
        });
        lane.registry.subscribe(
            lane.conn.as_ref(),
            SubscriptionKey::WalletTransactions {
                wallet: wallet.to_string(),
                chain,
            },
            payload,
        )
    }

    /// Unsubscribe by id; idempotent, tries both lanes since ids are
    /// globally unique
    pub fn unsubscribe(&self, id: &str) {
        self.evm.registry.unsubscribe(self.evm.conn.as_ref(), id);
        self.solana
            .registry
            .unsubscribe(self.solana.conn.as_ref(), id);
    }

    /// Open a lane's socket (also used to retry after its reconnect
    /// ceiling)
    pub fn connect(&self, family: ChainFamily) {
        self.lane(family).conn.connect();
    }

    pub async fn shutdown(&self) {
        self.evm.shutdown().await;
        self.solana.shutdown().await;
        self.batcher.flush_sync();
    }

    pub fn state(&self, family: ChainFamily) -> ConnectionState {
        self.lane(family).conn.state()
    }

    /// Combined counters for both lanes and the shared batcher
    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    pub fn active_subscriptions(&self) -> usize {
        self.evm.registry.active_len() + self.solana.registry.active_len()
    }
}

async fn pump(
    mut conn_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    conn: Arc<StreamConnection>,
    registry: Arc<SubscriptionRegistry>,
    batcher: UpdateBatcher<String, TransactionUpdate>,
    family: ChainFamily,
    event_tx: mpsc::UnboundedSender<(ChainFamily, ServiceEvent)>,
) {
    let mut was_connected = false;
    while let Some(event) = conn_events.recv().await {
        match event {
            ConnectionEvent::Connected => {
                registry.flush_pending(conn.as_ref());
                if was_connected {
                    let _ = event_tx.send((family, ServiceEvent::Reconnected));
                }
                was_connected = true;
            }
            ConnectionEvent::Frame(frame) => route_frame(frame, family, &batcher, &event_tx),
            ConnectionEvent::Disconnected { will_retry } => {
                registry.clear_active();
                if !will_retry {
                    batcher.flush_sync();
                }
            }
            ConnectionEvent::ReconnectsExhausted { attempts } => {
                let _ = event_tx.send((
                    family,
                    ServiceEvent::ConnectionLost(StreamError::ReconnectLimitExceeded(attempts)),
                ));
            }
        }
    }
}

fn route_frame(
    frame: InboundFrame,
    family: ChainFamily,
    batcher: &UpdateBatcher<String, TransactionUpdate>,
    event_tx: &mpsc::UnboundedSender<(ChainFamily, ServiceEvent)>,
) {
    match frame {
        InboundFrame::Data { data } => {
            let items = match data {
                Value::Array(items) => items,
                other => vec![other],
            };
            for item in items {
                match serde_json::from_value::<TransactionUpdate>(item) {
                    Ok(update) => batcher.add(update.dedup_key(), update),
                    Err(e) => warn!(error = %e, ?family, "dropping malformed transaction update"),
                }
            }
        }
        InboundFrame::SubscribedAck { subscription_id } => {
            debug!(id = %subscription_id, ?family, "transaction subscription acknowledged");
        }
        err @ InboundFrame::Error { .. } => {
            if err.is_benign_unsubscribe_race() {
                debug!(?family, "unsubscribe raced a server-side wipe, ignoring");
            } else if let InboundFrame::Error { message, code, .. } = err {
                warn!(message = %message, ?code, ?family, "transaction stream server error");
                let _ = event_tx.send((
                    family,
                    ServiceEvent::ServerError(StreamError::Server { message, code }),
                ));
            }
        }
        _ => {}
    }
}
