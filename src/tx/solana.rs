//! Solana transaction construction and broadcast
//!
//! Native sends are a single system transfer. SPL token sends move between
//! associated token accounts, creating the recipient's ATA in the same
//! transaction when it does not exist yet. Messages compile as v0 and are
//! serialized with a placeholder signature for the external signer to
//! replace.

use crate::config::SendConfig;
use crate::tx::error::SendError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// An unsigned, serialized Solana transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedSolanaTx {
    /// bincode-serialized v0 transaction with a placeholder signature,
    /// hex encoded for the signer
    pub payload_hex: String,
    /// The transfer also creates the recipient's token account
    pub creates_token_account: bool,
}

/// Builds and broadcasts Solana transactions against one RPC endpoint
pub struct SolanaTxBuilder {
    rpc: RpcClient,
    max_broadcast_retries: usize,
}

impl SolanaTxBuilder {
    pub fn new(rpc_url: impl Into<String>, config: &SendConfig) -> Self {
        let rpc = RpcClient::new_with_timeout_and_commitment(
            rpc_url.into(),
            Duration::from_secs(config.broadcast_timeout_secs),
            CommitmentConfig::confirmed(),
        );
        Self {
            rpc,
            max_broadcast_retries: config.max_broadcast_retries,
        }
    }

    /// Native SOL transfer
    pub async fn build_native_transfer(
        &self,
        from: &str,
        to: &str,
        lamports: u64,
    ) -> Result<UnsignedSolanaTx, SendError> {
        let from = parse_pubkey("from", from)?;
        let to = parse_pubkey("to", to)?;
        let blockhash = self.latest_blockhash().await?;

        let instructions = vec![system_instruction::transfer(&from, &to, lamports)];
        let payload_hex = compile_unsigned(&from, &instructions, blockhash)?;
        Ok(UnsignedSolanaTx {
            payload_hex,
            creates_token_account: false,
        })
    }

    /// SPL token transfer between associated token accounts
    ///
    /// The sender pays for creating the recipient's ATA when it is missing.
    pub async fn build_token_transfer(
        &self,
        from: &str,
        to: &str,
        mint: &str,
        amount: u64,
    ) -> Result<UnsignedSolanaTx, SendError> {
        let from = parse_pubkey("from", from)?;
        let to = parse_pubkey("to", to)?;
        let mint = parse_pubkey("token", mint)?;

        let dest_ata = get_associated_token_address(&to, &mint);
        let create_ata = !self.account_exists(&dest_ata).await?;
        if create_ata {
            debug!(ata = %dest_ata, "recipient token account missing, creating in-transaction");
        }
        let blockhash = self.latest_blockhash().await?;

        let instructions = token_transfer_instructions(&from, &to, &mint, amount, create_ata)?;
        let payload_hex = compile_unsigned(&from, &instructions, blockhash)?;
        Ok(UnsignedSolanaTx {
            payload_hex,
            creates_token_account: create_ata,
        })
    }

    /// Broadcast a signed transaction; returns its signature
    ///
    /// Preflight stays on so obviously-failing transactions are rejected
    /// before paying fees.
    pub async fn broadcast(&self, signed_hex: &str) -> Result<String, SendError> {
        let raw = hex::decode(signed_hex.trim_start_matches("0x"))
            .map_err(|e| SendError::Broadcast(format!("bad signed payload hex: {}", e)))?;
        let tx: VersionedTransaction = bincode::deserialize(&raw)
            .map_err(|e| SendError::Broadcast(format!("bad signed payload: {}", e)))?;

        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(self.max_broadcast_retries),
            ..Default::default()
        };
        let signature = self
            .rpc
            .send_transaction_with_config(&tx, config)
            .await
            .map_err(|e| SendError::Broadcast(e.to_string()))?;
        info!(signature = %signature, "solana transaction broadcast");
        Ok(signature.to_string())
    }

    async fn latest_blockhash(&self) -> Result<Hash, SendError> {
        self.rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| SendError::Blockhash(e.to_string()))
    }

    async fn account_exists(&self, pubkey: &Pubkey) -> Result<bool, SendError> {
        let response = self
            .rpc
            .get_account_with_commitment(pubkey, CommitmentConfig::confirmed())
            .await
            .map_err(|e| SendError::rpc(e.to_string()))?;
        Ok(response.value.is_some())
    }
}

fn parse_pubkey(field: &'static str, address: &str) -> Result<Pubkey, SendError> {
    Pubkey::from_str(address).map_err(|_| SendError::invalid_address(field, address))
}

/// Token transfer instruction list, optionally prefixed by ATA creation
fn token_transfer_instructions(
    from: &Pubkey,
    to: &Pubkey,
    mint: &Pubkey,
    amount: u64,
    create_ata: bool,
) -> Result<Vec<Instruction>, SendError> {
    let source_ata = get_associated_token_address(from, mint);
    let dest_ata = get_associated_token_address(to, mint);

    let mut instructions = Vec::with_capacity(2);
    if create_ata {
        instructions.push(create_associated_token_account(
            from,
            to,
            mint,
            &spl_token::id(),
        ));
    }
    instructions.push(
        spl_token::instruction::transfer(
            &spl_token::id(),
            &source_ata,
            &dest_ata,
            from,
            &[],
            amount,
        )
        .map_err(|e| SendError::build(e.to_string()))?,
    );
    Ok(instructions)
}

/// Compile a v0 message and serialize it with a placeholder signature
fn compile_unsigned(
    payer: &Pubkey,
    instructions: &[Instruction],
    blockhash: Hash,
) -> Result<String, SendError> {
    let message = v0::Message::try_compile(payer, instructions, &[], blockhash)
        .map_err(|e| SendError::build(e.to_string()))?;
    let tx = VersionedTransaction {
        signatures: vec![Signature::default()],
        message: VersionedMessage::V0(message),
    };
    let raw = bincode::serialize(&tx).map_err(|e| SendError::build(e.to_string()))?;
    Ok(hex::encode(raw))
}
