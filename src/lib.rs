//! Wallet core: real-time streaming and transaction sending for a
//! multi-chain (EVM + Solana) wallet
//!
//! Two subsystems share the chain model and configuration:
//!
//! - [`stream`]: WebSocket services for positions, wallet transactions and
//!   the pulse token feed, with automatic reconnection, subscription
//!   bookkeeping and update batching.
//! - [`tx`]: unsigned transaction construction (EIP-1559 on EVM, v0
//!   messages on Solana), fee estimation and send orchestration through an
//!   external signer.

pub mod chain;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod rpc;
pub mod stream;
pub mod tx;

pub use chain::{ChainFamily, ChainId};
pub use config::CoreConfig;
pub use observability::{init_tracing, CorrelationId};
pub use stream::{
    PositionStreamService, PulseStreamService, ServiceEvent, TransactionStreamService,
};
pub use tx::{SendOrchestrator, SendRequest, SendResult, WalletSigner};
