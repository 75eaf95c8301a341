//! WebSocket connection lifecycle
//!
//! One [`StreamConnection`] owns exactly one socket: its keepalive ping
//! loop and its exponential-backoff reconnect loop. The socket lives on a
//! spawned task; callers talk to it through a command channel and observe
//! it through a `watch`-published [`ConnectionState`] plus an event
//! channel. The connection is chain-agnostic; frame semantics belong to
//! the services composing it.

use crate::metrics::StreamMetrics;
use crate::stream::error::ExponentialBackoff;
use crate::stream::wire::{self, InboundFrame};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// UI-visible connectivity; the only way connectivity is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect ceiling reached; requires an explicit `connect()`
    Error,
}

/// Events delivered to the owning service
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Socket opened (initial connect or reconnect)
    Connected,
    /// Decoded inbound frame, in receipt order
    Frame(InboundFrame),
    /// Socket closed; `will_retry` is false only for deliberate disconnects
    /// and normal server closes
    Disconnected { will_retry: bool },
    /// Backoff ceiling reached after `attempts` tries; the connection is
    /// terminal until the caller reconnects explicitly
    ReconnectsExhausted { attempts: u32 },
}

/// Tuning for one connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_cap_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_millis(500),
            reconnect_cap_delay: Duration::from_secs(30),
            max_reconnect_attempts: 8,
        }
    }
}

enum Command {
    Send(String),
    Disconnect,
}

enum CloseReason {
    /// `disconnect()` or a normal server close; never reconnect
    Deliberate,
    /// Abnormal close or socket error; schedule a reconnect
    Abnormal,
}

/// Owns one WebSocket's full lifecycle
pub struct StreamConnection {
    config: ConnectionConfig,
    metrics: Arc<StreamMetrics>,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamConnection {
    /// Create a connection handle and the receiving half of its event
    /// channel; no socket is opened until `connect()`
    pub fn new(
        config: ConnectionConfig,
        metrics: Arc<StreamMetrics>,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let conn = Self {
            config,
            metrics,
            event_tx,
            state_tx,
            state_rx,
            cmd_tx: Mutex::new(None),
            task: Mutex::new(None),
        };
        (conn, event_rx)
    }

    /// Open the socket; no-op if already open or connecting
    pub fn connect(&self) {
        let mut task_guard = self.task.lock();
        if let Some(task) = task_guard.as_ref() {
            if !task.is_finished() {
                debug!(url = %self.config.url, "connect ignored, lifecycle task already running");
                return;
            }
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        *self.cmd_tx.lock() = Some(cmd_tx);

        let config = self.config.clone();
        let metrics = Arc::clone(&self.metrics);
        let event_tx = self.event_tx.clone();
        let state_tx = self.state_tx.clone();
        *task_guard = Some(tokio::spawn(run_lifecycle(
            config, metrics, event_tx, state_tx, cmd_rx,
        )));
    }

    /// Permanently stop the connection: cancels timers, suppresses
    /// auto-reconnect, closes the socket with a normal-closure code
    ///
    /// Resolves only after the lifecycle task has wound down, so no stale
    /// timer can fire against a torn-down connection.
    pub async fn disconnect(&self) {
        let cmd_tx = self.cmd_tx.lock().take();
        if let Some(cmd_tx) = cmd_tx {
            let _ = cmd_tx.send(Command::Disconnect);
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if timeout(Duration::from_secs(5), task).await.is_err() {
                warn!(url = %self.config.url, "lifecycle task did not wind down in time");
            }
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch handle for state transitions
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Send a JSON frame; logged no-op if the socket is not open
    ///
    /// Callers must check `is_connected()` or queue through the
    /// registry's pending set.
    pub fn send_json(&self, frame: &serde_json::Value) {
        if !self.is_connected() {
            warn!(url = %self.config.url, "dropping frame, socket not open");
            return;
        }
        let text = frame.to_string();
        let cmd_tx = self.cmd_tx.lock();
        match cmd_tx.as_ref() {
            Some(tx) => {
                let _ = tx.send(Command::Send(text));
            }
            None => warn!(url = %self.config.url, "dropping frame, no lifecycle task"),
        }
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }
}

async fn run_lifecycle(
    config: ConnectionConfig,
    metrics: Arc<StreamMetrics>,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    state_tx: watch::Sender<ConnectionState>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut backoff = ExponentialBackoff::new(
        config.reconnect_base_delay.as_millis() as u64,
        config.reconnect_cap_delay.as_millis() as u64,
    );

    loop {
        let reconnecting = backoff.attempt() > 0;
        state_tx.send_replace(if reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        });
        metrics
            .connect_attempts
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let connect = timeout(config.connect_timeout, connect_async(config.url.as_str())).await;
        match connect {
            Ok(Ok((socket, _response))) => {
                info!(url = %config.url, "stream connected");
                state_tx.send_replace(ConnectionState::Connected);
                backoff.reset();
                let _ = event_tx.send(ConnectionEvent::Connected);

                let reason =
                    drive_socket(socket, &config, &metrics, &event_tx, &mut cmd_rx).await;
                match reason {
                    CloseReason::Deliberate => {
                        state_tx.send_replace(ConnectionState::Disconnected);
                        let _ = event_tx.send(ConnectionEvent::Disconnected { will_retry: false });
                        return;
                    }
                    CloseReason::Abnormal => {
                        warn!(url = %config.url, "stream closed abnormally");
                        let _ = event_tx.send(ConnectionEvent::Disconnected { will_retry: true });
                    }
                }
            }
            Ok(Err(e)) => warn!(url = %config.url, error = %e, "connect failed"),
            Err(_) => warn!(url = %config.url, "connect timed out"),
        }

        if backoff.attempt() >= config.max_reconnect_attempts {
            warn!(
                url = %config.url,
                attempts = backoff.attempt(),
                "reconnect ceiling reached, giving up"
            );
            state_tx.send_replace(ConnectionState::Error);
            let _ = event_tx.send(ConnectionEvent::ReconnectsExhausted {
                attempts: backoff.attempt(),
            });
            return;
        }

        let delay = backoff.next_backoff();
        metrics
            .reconnects
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        state_tx.send_replace(ConnectionState::Reconnecting);
        debug!(url = %config.url, ?delay, attempt = backoff.attempt(), "reconnect scheduled");

        // Backoff wait, cancellable by a deliberate disconnect
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Disconnect) | None => {
                        state_tx.send_replace(ConnectionState::Disconnected);
                        let _ = event_tx.send(ConnectionEvent::Disconnected { will_retry: false });
                        return;
                    }
                    Some(Command::Send(_)) => {
                        warn!(url = %config.url, "dropping frame, socket not open");
                    }
                },
            }
        }
    }
}

async fn drive_socket(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    config: &ConnectionConfig,
    metrics: &StreamMetrics,
    event_tx: &mpsc::UnboundedSender<ConnectionEvent>,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> CloseReason {
    let (mut sink, mut stream) = socket.split();
    // First keepalive fires one full interval after open
    let mut ping = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        warn!(error = %e, "socket send failed");
                        return CloseReason::Abnormal;
                    }
                }
                Some(Command::Disconnect) | None => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client disconnect".into(),
                        })))
                        .await;
                    let _ = sink.close().await;
                    return CloseReason::Deliberate;
                }
            },
            _ = ping.tick() => {
                let text = wire::ping_frame().to_string();
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "keepalive send failed");
                    return CloseReason::Abnormal;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    metrics
                        .frames_received
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    match wire::decode_frame(&text) {
                        InboundFrame::Unparseable => {
                            metrics
                                .frames_dropped
                                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            warn!(frame = %text, "dropping unparseable frame");
                        }
                        // Liveness signal only; consumed here
                        InboundFrame::Pong => debug!("pong"),
                        frame => {
                            let _ = event_tx.send(ConnectionEvent::Frame(frame));
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let normal = frame
                        .as_ref()
                        .map(|f| f.code == CloseCode::Normal)
                        .unwrap_or(false);
                    info!(?frame, "server closed stream");
                    return if normal {
                        CloseReason::Deliberate
                    } else {
                        CloseReason::Abnormal
                    };
                }
                Some(Ok(_)) => {} // binary / raw frames ignored
                Some(Err(e)) => {
                    warn!(error = %e, "socket receive error");
                    return CloseReason::Abnormal;
                }
                None => return CloseReason::Abnormal,
            },
        }
    }
}
