//! External signer seam
//!
//! Private keys never enter this crate. The orchestrator hands a fully
//! built unsigned payload to a [`WalletSigner`] implementation (hardware
//! wallet, enclave, remote service) and gets back either a signed payload
//! to broadcast itself or, where the signer owns the network path, the
//! final transaction hash.

use crate::chain::ChainId;
use crate::observability::CorrelationId;
use crate::tx::error::SendError;
use async_trait::async_trait;

/// Everything a signer needs to sign one transaction
#[derive(Debug, Clone)]
pub struct SigningRequest {
    pub chain: ChainId,
    /// Sending address; selects the key
    pub from: String,
    /// Unsigned transaction, hex encoded
    /// (EVM: `0x02`-typed envelope; Solana: bincode v0 transaction with a
    /// placeholder signature)
    pub payload_hex: String,
    pub correlation_id: CorrelationId,
}

/// External signing backend
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Sign and return the signed serialized transaction; the caller
    /// broadcasts it (Solana path)
    async fn sign(&self, request: SigningRequest) -> Result<String, SendError>;

    /// Sign and broadcast in one step, returning the transaction hash
    /// (EVM path, where the signer submits through its own provider)
    async fn sign_and_send(&self, request: SigningRequest) -> Result<String, SendError>;
}
