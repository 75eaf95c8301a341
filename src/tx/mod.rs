//! Transaction construction and send pipeline
//!
//! Chain-specific builders ([`evm`], [`solana`]) produce unsigned
//! payloads; [`send::SendOrchestrator`] drives the full
//! validate / build / sign / broadcast flow through an external
//! [`signer::WalletSigner`].

pub mod amount;
pub mod error;
pub mod evm;
pub mod fees;
pub mod rlp;
pub mod send;
pub mod signer;
pub mod solana;

pub use amount::to_base_units;
pub use error::SendError;
pub use evm::Eip1559Tx;
pub use fees::{FeeEstimate, FeeEstimator};
pub use send::{SendOrchestrator, SendRequest, SendResult};
pub use signer::{SigningRequest, WalletSigner};
pub use solana::{SolanaTxBuilder, UnsignedSolanaTx};
