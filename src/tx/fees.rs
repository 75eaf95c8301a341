//! Fee and gas estimation
//!
//! Everything here has a safe fallback: a failed fee or gas estimate
//! degrades to a conservative constant instead of aborting the send.
//! Only nonce and blockhash fetches (which have no safe fallback) abort,
//! and those live with their builders.

use crate::rpc::EvmRpcClient;
use serde_json::Value;
use tracing::warn;

const GWEI: u128 = 1_000_000_000;

/// Flat priority tip
pub const PRIORITY_FEE_PER_GAS: u128 = 2 * GWEI;
/// Base fee assumed when the node cannot report one
pub const FALLBACK_BASE_FEE: u128 = 20 * GWEI;
/// Fee cap used when fee data is entirely unavailable
pub const FALLBACK_MAX_FEE: u128 = 50 * GWEI;

/// Gas limit fallback for a plain native transfer
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;
/// Gas limit fallback for an ERC-20 transfer
pub const TOKEN_TRANSFER_GAS: u64 = 100_000;

/// EIP-1559 fee caps plus a gas limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub gas_limit: u64,
}

/// Estimates EVM fee caps and gas limits against one RPC endpoint
pub struct FeeEstimator<'a> {
    rpc: &'a EvmRpcClient,
}

impl<'a> FeeEstimator<'a> {
    pub fn new(rpc: &'a EvmRpcClient) -> Self {
        Self { rpc }
    }

    /// Full estimate for one call: fee caps plus a buffered gas limit
    pub async fn estimate(&self, call: &Value, native_transfer: bool) -> FeeEstimate {
        let (max_fee_per_gas, max_priority_fee_per_gas) = self.fee_caps().await;
        let gas_limit = self.gas_limit(call, native_transfer).await;
        FeeEstimate {
            max_fee_per_gas,
            max_priority_fee_per_gas,
            gas_limit,
        }
    }

    /// Fee caps from the latest block's base fee
    ///
    /// `max_fee = 2 * base_fee + tip` absorbs base-fee growth across a few
    /// blocks of inclusion delay. Missing or failed fee data degrades to
    /// the fallback caps.
    pub async fn fee_caps(&self) -> (u128, u128) {
        let max_fee = match self.rpc.base_fee_per_gas().await {
            Ok(Some(base_fee)) => max_fee_from_base(base_fee),
            Ok(None) => {
                warn!("node reported no base fee, using fallback caps");
                max_fee_from_base(FALLBACK_BASE_FEE)
            }
            Err(e) => {
                warn!(error = %e, "base fee fetch failed, using fallback caps");
                FALLBACK_MAX_FEE
            }
        };
        (max_fee, PRIORITY_FEE_PER_GAS)
    }

    /// Node gas estimate with a 20% buffer, or the per-kind fallback
    pub async fn gas_limit(&self, call: &Value, native_transfer: bool) -> u64 {
        match self.rpc.estimate_gas(call).await {
            Ok(estimate) => buffered_gas(estimate),
            Err(e) => {
                let fallback = if native_transfer {
                    NATIVE_TRANSFER_GAS
                } else {
                    TOKEN_TRANSFER_GAS
                };
                warn!(error = %e, fallback, "gas estimation failed, using fallback");
                fallback
            }
        }
    }
}

fn max_fee_from_base(base_fee: u128) -> u128 {
    base_fee
        .saturating_mul(2)
        .saturating_add(PRIORITY_FEE_PER_GAS)
}

/// Add a 20% headroom so estimates from a slightly stale state still land
fn buffered_gas(estimate: u64) -> u64 {
    estimate.saturating_add(estimate / 5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SendConfig;
    use serde_json::json;

    #[test]
    fn test_max_fee_doubles_base_and_adds_tip() {
        assert_eq!(max_fee_from_base(20 * GWEI), 42 * GWEI);
        assert_eq!(max_fee_from_base(0), PRIORITY_FEE_PER_GAS);
    }

    #[test]
    fn test_gas_buffer_is_twenty_percent() {
        assert_eq!(buffered_gas(21_000), 25_200);
        assert_eq!(buffered_gas(0), 0);
        assert_eq!(buffered_gas(u64::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_fee_caps_from_latest_block() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            // 20 gwei base fee
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"baseFeePerGas":"0x4a817c800"}}"#)
            .create_async()
            .await;
        let rpc = EvmRpcClient::new(server.url(), &SendConfig::default());

        let (max_fee, tip) = FeeEstimator::new(&rpc).fee_caps().await;
        assert_eq!(max_fee, 42 * GWEI);
        assert_eq!(tip, PRIORITY_FEE_PER_GAS);
    }

    #[tokio::test]
    async fn test_fee_caps_fall_back_when_rpc_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(500)
            .create_async()
            .await;
        let rpc = EvmRpcClient::new(server.url(), &SendConfig::default());

        let (max_fee, _) = FeeEstimator::new(&rpc).fee_caps().await;
        assert_eq!(max_fee, FALLBACK_MAX_FEE);
    }

    #[tokio::test]
    async fn test_gas_limit_falls_back_per_kind() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(500)
            .create_async()
            .await;
        let rpc = EvmRpcClient::new(server.url(), &SendConfig::default());
        let estimator = FeeEstimator::new(&rpc);

        let call = json!({"to": "0x11", "value": "0x0"});
        assert_eq!(estimator.gas_limit(&call, true).await, NATIVE_TRANSFER_GAS);
        assert_eq!(estimator.gas_limit(&call, false).await, TOKEN_TRANSFER_GAS);
    }

    #[tokio::test]
    async fn test_gas_limit_buffers_node_estimate() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x5208"}"#)
            .create_async()
            .await;
        let rpc = EvmRpcClient::new(server.url(), &SendConfig::default());

        let gas = FeeEstimator::new(&rpc)
            .gas_limit(&json!({"to": "0x11"}), true)
            .await;
        assert_eq!(gas, 25_200);
    }
}
