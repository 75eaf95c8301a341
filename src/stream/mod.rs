//! Real-time streaming subsystem
//!
//! Three services compose the same primitives: a lifecycle-owning
//! [`connection::StreamConnection`], a [`registry::SubscriptionRegistry`]
//! for subscription identity, and an [`batcher::UpdateBatcher`] that
//! coalesces bursts before they reach consumers.

pub mod batcher;
pub mod connection;
pub mod error;
pub mod positions;
pub mod pulse;
pub mod registry;
pub mod transactions;
pub mod wire;

pub use batcher::UpdateBatcher;
pub use connection::{ConnectionConfig, ConnectionEvent, ConnectionState, StreamConnection};
pub use error::{ExponentialBackoff, StreamError};
pub use positions::{PositionStreamService, PositionUpdate};
pub use pulse::{PulseOutput, PulseStreamService, PulseUpdate, PulseUpdateKind};
pub use registry::{FrameSink, Subscription, SubscriptionKey, SubscriptionRegistry};
pub use transactions::{TransactionStreamService, TransactionUpdate};
pub use wire::InboundFrame;

/// Out-of-band notifications a stream service raises to its consumer
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// Socket reopened after an abnormal close. Server-side subscription
    /// state was wiped; the consumer re-issues whatever it still wants.
    Reconnected,
    /// Reconnect ceiling reached; the service stays down until an explicit
    /// `connect()`. Carries the terminal error, including the attempt count.
    ConnectionLost(StreamError),
    /// Server-reported error that is not the benign unsubscribe race
    ServerError(StreamError),
}
