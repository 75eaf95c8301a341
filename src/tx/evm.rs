//! EVM transaction construction
//!
//! Builds unsigned EIP-1559 (type 2) transactions: the typed-envelope
//! prefix byte followed by the RLP list of nine fields, always with an
//! empty access list. ERC-20 sends target the token contract with
//! `transfer(address,uint256)` calldata and zero native value.

use crate::tx::error::SendError;
use crate::tx::rlp;

/// `transfer(address,uint256)` selector
pub const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// EIP-1559 transaction envelope type byte
pub const EIP1559_TX_TYPE: u8 = 0x02;

/// Unsigned EIP-1559 transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Tx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: [u8; 20],
    /// Native value in wei; zero for token transfers
    pub value: u128,
    pub data: Vec<u8>,
}

impl Eip1559Tx {
    /// Serialize to the unsigned typed envelope: `0x02 || rlp([...])`
    pub fn encode(&self) -> Vec<u8> {
        let fields = vec![
            rlp::encode_u64(self.chain_id),
            rlp::encode_u64(self.nonce),
            rlp::encode_u128(self.max_priority_fee_per_gas),
            rlp::encode_u128(self.max_fee_per_gas),
            rlp::encode_u64(self.gas_limit),
            rlp::encode_bytes(&self.to),
            rlp::encode_u128(self.value),
            rlp::encode_bytes(&self.data),
            // Access list is always empty
            rlp::encode_list(&[]),
        ];
        let mut out = vec![EIP1559_TX_TYPE];
        out.extend(rlp::encode_list(&fields));
        out
    }

    /// Hex form handed to the signer
    pub fn encode_hex(&self) -> String {
        format!("0x{}", hex::encode(self.encode()))
    }

    /// Parse an unsigned typed envelope back into its fields
    pub fn decode(raw: &[u8]) -> Result<Self, SendError> {
        let payload = match raw.split_first() {
            Some((&EIP1559_TX_TYPE, rest)) => rest,
            Some((other, _)) => {
                return Err(SendError::build(format!(
                    "unexpected tx type byte 0x{:02x}",
                    other
                )))
            }
            None => return Err(SendError::build("empty transaction payload")),
        };
        let item = rlp::decode(payload).map_err(|e| SendError::build(e.to_string()))?;
        let fields = item
            .as_list()
            .ok_or_else(|| SendError::build("expected RLP list"))?;
        if fields.len() != 9 {
            return Err(SendError::build(format!(
                "expected 9 fields, got {}",
                fields.len()
            )));
        }

        let field_u64 = |i: usize, name: &str| {
            fields[i]
                .as_u64()
                .ok_or_else(|| SendError::build(format!("bad field: {}", name)))
        };
        let field_u128 = |i: usize, name: &str| {
            fields[i]
                .as_u128()
                .ok_or_else(|| SendError::build(format!("bad field: {}", name)))
        };

        let to_bytes = fields[5]
            .as_bytes()
            .ok_or_else(|| SendError::build("bad field: to"))?;
        let to: [u8; 20] = to_bytes
            .try_into()
            .map_err(|_| SendError::build("to address must be 20 bytes"))?;
        let data = fields[7]
            .as_bytes()
            .ok_or_else(|| SendError::build("bad field: data"))?
            .to_vec();
        let access_list = fields[8]
            .as_list()
            .ok_or_else(|| SendError::build("bad field: access list"))?;
        if !access_list.is_empty() {
            return Err(SendError::build("access list must be empty"));
        }

        Ok(Self {
            chain_id: field_u64(0, "chain id")?,
            nonce: field_u64(1, "nonce")?,
            max_priority_fee_per_gas: field_u128(2, "max priority fee")?,
            max_fee_per_gas: field_u128(3, "max fee")?,
            gas_limit: field_u64(4, "gas limit")?,
            to,
            value: field_u128(6, "value")?,
            data,
        })
    }
}

/// Decode a checks-passed `0x…` address into its 20 bytes
pub fn parse_evm_address(address: &str) -> Result<[u8; 20], SendError> {
    let hex_part = address
        .strip_prefix("0x")
        .ok_or_else(|| SendError::invalid_address("to", address))?;
    let bytes = hex::decode(hex_part).map_err(|_| SendError::invalid_address("to", address))?;
    bytes
        .try_into()
        .map_err(|_| SendError::invalid_address("to", address))
}

/// ABI-encoded `transfer(address,uint256)` calldata
pub fn erc20_transfer_calldata(to: [u8; 20], amount: u128) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 + 32);
    data.extend_from_slice(&ERC20_TRANSFER_SELECTOR);
    // address, left-padded to 32 bytes
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(&to);
    // amount, left-padded to 32 bytes
    data.extend_from_slice(&[0u8; 16]);
    data.extend_from_slice(&amount.to_be_bytes());
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Eip1559Tx {
        Eip1559Tx {
            chain_id: 1,
            nonce: 26,
            max_priority_fee_per_gas: 2_000_000_000,
            max_fee_per_gas: 42_000_000_000,
            gas_limit: 21_000,
            to: [0x11; 20],
            value: 1_500_000_000_000_000_000,
            data: Vec::new(),
        }
    }

    #[test]
    fn test_encode_is_typed_envelope() {
        let raw = sample_tx().encode();
        assert_eq!(raw[0], 0x02);
        // Nine-field list with an empty access list at the end
        assert_eq!(*raw.last().unwrap(), 0xc0);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let tx = sample_tx();
        assert_eq!(Eip1559Tx::decode(&tx.encode()).unwrap(), tx);

        let mut with_data = sample_tx();
        with_data.value = 0;
        with_data.data = erc20_transfer_calldata([0x22; 20], 7);
        assert_eq!(Eip1559Tx::decode(&with_data.encode()).unwrap(), with_data);
    }

    #[test]
    fn test_decode_rejects_wrong_type_byte() {
        let mut raw = sample_tx().encode();
        raw[0] = 0x01;
        let err = Eip1559Tx::decode(&raw).unwrap_err();
        assert!(err.to_string().contains("0x01"));
    }

    #[test]
    fn test_erc20_calldata_layout() {
        let to = [0xab; 20];
        let data = erc20_transfer_calldata(to, 1_000_000);
        assert_eq!(data.len(), 68);
        assert_eq!(&data[0..4], &ERC20_TRANSFER_SELECTOR);
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], &to);
        assert_eq!(&data[36..52], &[0u8; 16]);
        assert_eq!(&data[52..68], &1_000_000u128.to_be_bytes());
    }

    #[test]
    fn test_parse_evm_address() {
        let parsed = parse_evm_address("0x1111111111111111111111111111111111111111").unwrap();
        assert_eq!(parsed, [0x11; 20]);
        assert!(parse_evm_address("1111111111111111111111111111111111111111").is_err());
        assert!(parse_evm_address("0x1111").is_err());
    }
}
