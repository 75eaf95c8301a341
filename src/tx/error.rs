//! Error types for the send pipeline
//!
//! Covers the whole `execute_send` lifecycle: validation, fee estimation,
//! transaction construction, signing and broadcast. Errors are informative
//! (rich context for debugging), composable (easy conversion from underlying
//! error types) and observable (stable categories for metrics).

use thiserror::Error;

/// Error type for all transaction construction and send operations
#[derive(Error, Debug)]
pub enum SendError {
    /// Input failed validation before any network call
    ///
    /// Missing addresses, malformed recipient for the wallet's address
    /// family, non-positive or unparseable amount.
    #[error("Validation error ({field}): {reason}")]
    Validation {
        /// The input field that failed
        field: &'static str,
        /// Detailed reason for the failure
        reason: String,
    },

    /// Nonce fetch failed (EVM)
    ///
    /// There is no safe fallback for a nonce; this aborts the send.
    #[error("Nonce fetch failed: {0}")]
    Nonce(String),

    /// Blockhash fetch failed (Solana)
    ///
    /// There is no safe fallback for a blockhash; this aborts the send.
    #[error("Blockhash error: {0}")]
    Blockhash(String),

    /// Transaction construction failed
    ///
    /// Instruction assembly, address decoding or payload serialization.
    #[error("Transaction build error: {0}")]
    Build(String),

    /// The external signer rejected or failed the request
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Broadcast was rejected by the RPC node
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    /// RPC communication failure
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Chain or token configuration problem
    ///
    /// Unknown chain id, missing RPC URL, decimals out of range.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Wrapped error from external crates
    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl SendError {
    /// Check if this error is potentially retryable
    ///
    /// Retries only ever happen before broadcast; once a broadcast is
    /// accepted the send is terminal either way.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Nonce(_) => true,
            Self::Blockhash(_) => true,
            Self::Rpc(_) => true,

            Self::Validation { .. } => false,
            Self::Build(_) => false,
            Self::Signing(_) => false,
            Self::Broadcast(_) => false,
            Self::Configuration(_) => false,
            Self::External(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Nonce(_) => "nonce",
            Self::Blockhash(_) => "blockhash",
            Self::Build(_) => "build",
            Self::Signing(_) => "signing",
            Self::Broadcast(_) => "broadcast",
            Self::Rpc(_) => "rpc",
            Self::Configuration(_) => "config",
            Self::External(_) => "external",
        }
    }
}

// Convenience constructors for common error scenarios
impl SendError {
    pub fn invalid_address(field: &'static str, address: impl std::fmt::Display) -> Self {
        Self::Validation {
            field,
            reason: format!("invalid address: {}", address),
        }
    }

    pub fn invalid_amount(amount: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Validation {
            field: "amount",
            reason: format!("{} ({})", reason, amount),
        }
    }

    pub fn missing_field(field: &'static str) -> Self {
        Self::Validation {
            field,
            reason: "missing required field".to_string(),
        }
    }

    pub fn rpc(reason: impl Into<String>) -> Self {
        Self::Rpc(reason.into())
    }

    pub fn build(reason: impl Into<String>) -> Self {
        Self::Build(reason.into())
    }
}
