//! Minimal EVM JSON-RPC client
//!
//! Only the handful of read methods the send pipeline needs, with
//! per-call timeouts tiered by cost: light state reads and heavier
//! estimation calls. Broadcast happens through the external signer.

use crate::config::SendConfig;
use crate::tx::error::SendError;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub struct EvmRpcClient {
    http: reqwest::Client,
    url: String,
    light_timeout: Duration,
    heavy_timeout: Duration,
}

impl EvmRpcClient {
    pub fn new(url: impl Into<String>, config: &SendConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            light_timeout: Duration::from_secs(config.light_timeout_secs),
            heavy_timeout: Duration::from_secs(config.heavy_timeout_secs),
        }
    }

    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, String> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, url = %self.url, "rpc call");
        let response = self
            .http
            .post(&self.url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("{}: {}", method, e))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| format!("{}: bad response body: {}", method, e))?;
        if let Some(error) = value.get("error") {
            return Err(format!("{}: {}", method, error));
        }
        value
            .get("result")
            .cloned()
            .ok_or_else(|| format!("{}: missing result", method))
    }

    /// Pending-state nonce, so queued transactions are counted
    pub async fn transaction_count(&self, address: &str) -> Result<u64, SendError> {
        let result = self
            .call(
                "eth_getTransactionCount",
                json!([address, "pending"]),
                self.light_timeout,
            )
            .await
            .map_err(SendError::Nonce)?;
        parse_quantity_u64(&result).map_err(SendError::Nonce)
    }

    /// `baseFeePerGas` of the latest block; `None` on pre-London chains
    pub async fn base_fee_per_gas(&self) -> Result<Option<u128>, SendError> {
        let block = self
            .call(
                "eth_getBlockByNumber",
                json!(["latest", false]),
                self.heavy_timeout,
            )
            .await
            .map_err(SendError::rpc)?;
        match block.get("baseFeePerGas") {
            Some(value) => parse_quantity_u128(value).map(Some).map_err(SendError::Rpc),
            None => Ok(None),
        }
    }

    /// Node-side gas estimate for a call object
    pub async fn estimate_gas(&self, tx: &Value) -> Result<u64, SendError> {
        let result = self
            .call("eth_estimateGas", json!([tx]), self.heavy_timeout)
            .await
            .map_err(SendError::Rpc)?;
        parse_quantity_u64(&result).map_err(SendError::Rpc)
    }

}

fn parse_quantity_u128(value: &Value) -> Result<u128, String> {
    let s = value
        .as_str()
        .ok_or_else(|| format!("quantity not a string: {}", value))?;
    let hex = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(hex, 16).map_err(|e| format!("bad quantity {}: {}", s, e))
}

fn parse_quantity_u64(value: &Value) -> Result<u64, String> {
    let q = parse_quantity_u128(value)?;
    u64::try_from(q).map_err(|_| format!("quantity out of range: {}", q))
}
