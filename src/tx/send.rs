//! Send orchestration
//!
//! One entry point, `execute_send`, drives a transfer end to end:
//! validate inputs, convert the amount to base units, build the unsigned
//! transaction for the wallet's chain family, hand it to the external
//! signer and broadcast. Validation failures return before any network
//! call is made.

use crate::chain::{self, ChainFamily, ChainId};
use crate::config::{ChainRpcConfig, CoreConfig};
use crate::metrics::SendMetrics;
use crate::observability::CorrelationId;
use crate::rpc::EvmRpcClient;
use crate::tx::amount::to_base_units;
use crate::tx::error::SendError;
use crate::tx::evm::{erc20_transfer_calldata, parse_evm_address, Eip1559Tx};
use crate::tx::fees::FeeEstimator;
use crate::tx::signer::{SigningRequest, WalletSigner};
use crate::tx::solana::SolanaTxBuilder;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// A transfer to execute
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub chain: ChainId,
    pub from: String,
    pub to: String,
    /// Human-readable decimal amount, e.g. `"1.5"`
    pub amount: String,
    /// Token contract / mint; absent or sentinel means the native asset
    pub token_address: Option<String>,
    pub token_symbol: Option<String>,
    /// Overrides the chain-family default (18 EVM, 9 Solana)
    pub token_decimals: Option<u32>,
}

/// Outcome of a broadcast send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub tx_hash: String,
    pub explorer_url: Option<String>,
    pub correlation_id: CorrelationId,
}

/// Drives transfers through validation, construction, signing and
/// broadcast
pub struct SendOrchestrator {
    config: Arc<CoreConfig>,
    signer: Arc<dyn WalletSigner>,
    metrics: Arc<SendMetrics>,
}

impl SendOrchestrator {
    pub fn new(config: Arc<CoreConfig>, signer: Arc<dyn WalletSigner>) -> Self {
        Self {
            config,
            signer,
            metrics: Arc::new(SendMetrics::new()),
        }
    }

    /// Execute one transfer end to end
    pub async fn execute_send(&self, request: SendRequest) -> Result<SendResult, SendError> {
        self.metrics
            .sends_started
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let correlation_id = CorrelationId::new();
        info!(
            correlation_id = %correlation_id,
            chain = %request.chain,
            "send started"
        );

        let result = self.execute_inner(&request, correlation_id.clone()).await;
        match &result {
            Ok(outcome) => {
                self.metrics.record_result(true);
                info!(
                    correlation_id = %correlation_id,
                    tx_hash = %outcome.tx_hash,
                    "send succeeded"
                );
            }
            Err(e) => {
                self.metrics.record_result(false);
                warn!(
                    correlation_id = %correlation_id,
                    category = e.category(),
                    error = %e,
                    "send failed"
                );
            }
        }
        result
    }

    pub fn metrics(&self) -> &SendMetrics {
        &self.metrics
    }

    async fn execute_inner(
        &self,
        request: &SendRequest,
        correlation_id: CorrelationId,
    ) -> Result<SendResult, SendError> {
        validate_request(request)?;

        let decimals = request
            .token_decimals
            .unwrap_or_else(|| request.chain.default_decimals());
        let base_units = to_base_units(&request.amount, decimals)?;

        let chain_config = self.config.chain(&request.chain).ok_or_else(|| {
            SendError::Configuration(format!("no RPC configured for {}", request.chain))
        })?;
        let native = chain::is_native_asset(
            &request.chain,
            request.token_address.as_deref(),
            request.token_symbol.as_deref(),
            chain_config.native_symbol.as_deref(),
        );

        let tx_hash = match request.chain.family() {
            ChainFamily::Evm => {
                self.send_evm(request, chain_config, base_units, native, &correlation_id)
                    .await?
            }
            ChainFamily::Solana => {
                self.send_solana(request, chain_config, base_units, native, &correlation_id)
                    .await?
            }
        };

        Ok(SendResult {
            explorer_url: explorer_url(chain_config, &tx_hash),
            tx_hash,
            correlation_id,
        })
    }

    async fn send_evm(
        &self,
        request: &SendRequest,
        chain_config: &ChainRpcConfig,
        base_units: u128,
        native: bool,
        correlation_id: &CorrelationId,
    ) -> Result<String, SendError> {
        let chain_id = request
            .chain
            .evm_chain_id()
            .ok_or_else(|| SendError::Configuration("not an EVM chain".to_string()))?;
        let rpc = EvmRpcClient::new(chain_config.rpc_url.clone(), &self.config.send);

        // Nonce has no safe fallback; failure aborts here
        let nonce = rpc.transaction_count(&request.from).await?;

        let (to, value, data) = if native {
            (parse_evm_address(&request.to)?, base_units, Vec::new())
        } else {
            let token = request
                .token_address
                .as_deref()
                .ok_or_else(|| SendError::missing_field("token_address"))?;
            if !chain::is_valid_evm_address(token) {
                return Err(SendError::invalid_address("token_address", token));
            }
            let token = parse_evm_address(token)?;
            let recipient = parse_evm_address(&request.to)?;
            (token, 0, erc20_transfer_calldata(recipient, base_units))
        };

        let call = json!({
            "from": request.from,
            "to": format!("0x{}", hex::encode(to)),
            "value": format!("0x{:x}", value),
            "data": format!("0x{}", hex::encode(&data)),
        });
        let fees = FeeEstimator::new(&rpc).estimate(&call, native).await;

        let tx = Eip1559Tx {
            chain_id,
            nonce,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            max_fee_per_gas: fees.max_fee_per_gas,
            gas_limit: fees.gas_limit,
            to,
            value,
            data,
        };

        self.signer
            .sign_and_send(SigningRequest {
                chain: request.chain.clone(),
                from: request.from.clone(),
                payload_hex: tx.encode_hex(),
                correlation_id: correlation_id.clone(),
            })
            .await
    }

    async fn send_solana(
        &self,
        request: &SendRequest,
        chain_config: &ChainRpcConfig,
        base_units: u128,
        native: bool,
        correlation_id: &CorrelationId,
    ) -> Result<String, SendError> {
        let lamports = u64::try_from(base_units)
            .map_err(|_| SendError::invalid_amount(&request.amount, "amount exceeds u64 range"))?;
        let builder = SolanaTxBuilder::new(chain_config.rpc_url.clone(), &self.config.send);

        let unsigned = if native {
            builder
                .build_native_transfer(&request.from, &request.to, lamports)
                .await?
        } else {
            let mint = request
                .token_address
                .as_deref()
                .ok_or_else(|| SendError::missing_field("token_address"))?;
            builder
                .build_token_transfer(&request.from, &request.to, mint, lamports)
                .await?
        };

        let signed = self
            .signer
            .sign(SigningRequest {
                chain: request.chain.clone(),
                from: request.from.clone(),
                payload_hex: unsigned.payload_hex,
                correlation_id: correlation_id.clone(),
            })
            .await?;
        builder.broadcast(&signed).await
    }
}

/// Input checks that must pass before any network call
fn validate_request(request: &SendRequest) -> Result<(), SendError> {
    if request.from.is_empty() {
        return Err(SendError::missing_field("from"));
    }
    if request.to.is_empty() {
        return Err(SendError::missing_field("to"));
    }
    let family = request.chain.family();
    if !chain::is_valid_address(family, &request.from) {
        return Err(SendError::invalid_address("from", &request.from));
    }
    if !chain::is_valid_address(family, &request.to) {
        return Err(SendError::invalid_address("to", &request.to));
    }
    if let Some(decimals) = request.token_decimals {
        if decimals > 38 {
            return Err(SendError::Configuration(format!(
                "decimals out of range: {}",
                decimals
            )));
        }
    }
    Ok(())
}

fn explorer_url(chain_config: &ChainRpcConfig, tx_hash: &str) -> Option<String> {
    chain_config
        .explorer_url
        .as_deref()
        .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVM_WALLET: &str = "0x1111111111111111111111111111111111111111";
    const EVM_RECIPIENT: &str = "0x2222222222222222222222222222222222222222";
    const SOL_WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn evm_request() -> SendRequest {
        SendRequest {
            chain: ChainId::Evm(1),
            from: EVM_WALLET.to_string(),
            to: EVM_RECIPIENT.to_string(),
            amount: "1.5".to_string(),
            token_address: None,
            token_symbol: None,
            token_decimals: None,
        }
    }

    #[test]
    fn test_validate_rejects_cross_family_recipient() {
        let mut request = evm_request();
        request.to = SOL_WALLET.to_string();
        let err = validate_request(&request).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let mut request = evm_request();
        request.from = String::new();
        assert!(validate_request(&request).is_err());

        let mut request = evm_request();
        request.to = String::new();
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn test_validate_accepts_matching_family() {
        assert!(validate_request(&evm_request()).is_ok());

        let solana = SendRequest {
            chain: ChainId::Solana("mainnet".to_string()),
            from: SOL_WALLET.to_string(),
            to: SOL_WALLET.to_string(),
            amount: "0.1".to_string(),
            token_address: None,
            token_symbol: None,
            token_decimals: None,
        };
        assert!(validate_request(&solana).is_ok());
    }

    #[test]
    fn test_explorer_url_joins_without_double_slash() {
        let config = ChainRpcConfig {
            rpc_url: "https://rpc".to_string(),
            native_symbol: None,
            explorer_url: Some("https://etherscan.io/".to_string()),
        };
        assert_eq!(
            explorer_url(&config, "0xhash").as_deref(),
            Some("https://etherscan.io/tx/0xhash")
        );

        let none = ChainRpcConfig {
            rpc_url: "https://rpc".to_string(),
            native_symbol: None,
            explorer_url: None,
        };
        assert_eq!(explorer_url(&none, "0xhash"), None);
    }
}
