//! Chain identity and address handling
//!
//! Every chain-family branch in the core keys off a parsed [`ChainId`],
//! never off free-text chain names. The wire form is a prefixed string:
//! `evm:<numericId>` or `solana:<cluster>`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two chain families the core understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evm => write!(f, "evm"),
            Self::Solana => write!(f, "solana"),
        }
    }
}

/// Parsed chain identifier
///
/// `evm:8453` parses to `ChainId::Evm(8453)`; `solana:mainnet` parses to
/// `ChainId::Solana("mainnet")`. Display round-trips to the wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainId {
    Evm(u64),
    Solana(String),
}

impl ChainId {
    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Evm(_) => ChainFamily::Evm,
            Self::Solana(_) => ChainFamily::Solana,
        }
    }

    /// Numeric chain id for EVM chains, `None` for Solana
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            Self::Evm(id) => Some(*id),
            Self::Solana(_) => None,
        }
    }

    /// Default native-asset decimals for the family (overridable per token)
    pub fn default_decimals(&self) -> u32 {
        match self {
            Self::Evm(_) => 18,
            Self::Solana(_) => 9,
        }
    }

    /// Native asset ticker for the family
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Self::Evm(_) => "ETH",
            Self::Solana(_) => "SOL",
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evm(id) => write!(f, "evm:{}", id),
            Self::Solana(cluster) => write!(f, "solana:{}", cluster),
        }
    }
}

/// Error parsing a chain identifier string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid chain id: {0}")]
pub struct ChainIdParseError(pub String);

impl FromStr for ChainId {
    type Err = ChainIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("evm", id)) => id
                .parse::<u64>()
                .map(ChainId::Evm)
                .map_err(|_| ChainIdParseError(s.to_string())),
            Some(("solana", cluster)) if !cluster.is_empty() => {
                Ok(ChainId::Solana(cluster.to_string()))
            }
            _ => Err(ChainIdParseError(s.to_string())),
        }
    }
}

impl Serialize for ChainId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// EVM sentinel address conventionally used to mean "the native asset"
pub const EVM_NATIVE_SENTINEL: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";
/// EVM zero address, also treated as a native placeholder
pub const EVM_ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
/// Wrapped-SOL mint, Solana's native placeholder
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Validate an address against the family's format
///
/// EVM: `0x` + 40 hex chars. Solana: base58 of 32..=44 chars decoding to a
/// 32-byte key. Neither format validates against the other family.
pub fn is_valid_address(family: ChainFamily, address: &str) -> bool {
    match family {
        ChainFamily::Evm => is_valid_evm_address(address),
        ChainFamily::Solana => is_valid_solana_address(address),
    }
}

pub fn is_valid_evm_address(address: &str) -> bool {
    let Some(hex_part) = address.strip_prefix("0x") else {
        return false;
    };
    hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn is_valid_solana_address(address: &str) -> bool {
    if address.len() < 32 || address.len() > 44 {
        return false;
    }
    matches!(bs58::decode(address).into_vec(), Ok(bytes) if bytes.len() == 32)
}

/// Whether a transfer described by an optional token address/symbol targets
/// the chain's native asset rather than a token contract/mint
///
/// `native_symbol` overrides the family default for chains whose ticker
/// differs (e.g. POL on Polygon); `None` falls back to
/// [`ChainId::native_symbol`].
pub fn is_native_asset(
    chain: &ChainId,
    token_address: Option<&str>,
    symbol: Option<&str>,
    native_symbol: Option<&str>,
) -> bool {
    let Some(address) = token_address else {
        return true;
    };
    let placeholder = match chain.family() {
        ChainFamily::Evm => {
            address.eq_ignore_ascii_case(EVM_NATIVE_SENTINEL)
                || address.eq_ignore_ascii_case(EVM_ZERO_ADDRESS)
        }
        ChainFamily::Solana => address == WRAPPED_SOL_MINT,
    };
    if placeholder {
        return true;
    }
    let native_symbol = native_symbol.unwrap_or_else(|| chain.native_symbol());
    matches!(symbol, Some(sym) if sym.eq_ignore_ascii_case(native_symbol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_parse_round_trip() {
        let evm: ChainId = "evm:8453".parse().unwrap();
        assert_eq!(evm, ChainId::Evm(8453));
        assert_eq!(evm.to_string(), "evm:8453");

        let sol: ChainId = "solana:mainnet".parse().unwrap();
        assert_eq!(sol, ChainId::Solana("mainnet".to_string()));
        assert_eq!(sol.to_string(), "solana:mainnet");
    }

    #[test]
    fn test_chain_id_parse_rejects_garbage() {
        assert!("ethereum".parse::<ChainId>().is_err());
        assert!("evm:mainnet".parse::<ChainId>().is_err());
        assert!("solana:".parse::<ChainId>().is_err());
        assert!("".parse::<ChainId>().is_err());
    }

    #[test]
    fn test_evm_address_validation() {
        assert!(is_valid_evm_address(
            "0xAbC1234567890123456789012345678901234567"
        ));
        assert!(!is_valid_evm_address(
            "AbC1234567890123456789012345678901234567"
        ));
        // Too short / too long
        assert!(!is_valid_evm_address("0xAbC12345"));
        assert!(!is_valid_evm_address(
            "0xAbC12345678901234567890123456789012345678"
        ));
        // Non-hex
        assert!(!is_valid_evm_address(
            "0xZZZ1234567890123456789012345678901234567"
        ));
    }

    #[test]
    fn test_solana_address_validation() {
        assert!(is_valid_solana_address(WRAPPED_SOL_MINT));
        assert!(is_valid_solana_address(
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        ));
        // Base58 rejects 0/O/I/l
        assert!(!is_valid_solana_address(
            "0OIl111111111111111111111111111111111111111"
        ));
        assert!(!is_valid_solana_address("short"));
    }

    #[test]
    fn test_cross_family_validation() {
        // Neither format validates against the other chain's validator
        assert!(!is_valid_solana_address(
            "0xAbC1234567890123456789012345678901234567"
        ));
        assert!(!is_valid_evm_address(
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        ));
    }

    #[test]
    fn test_native_asset_detection() {
        let evm = ChainId::Evm(1);
        let sol = ChainId::Solana("mainnet".to_string());

        assert!(is_native_asset(&evm, None, None, None));
        assert!(is_native_asset(&evm, Some(EVM_NATIVE_SENTINEL), None, None));
        assert!(is_native_asset(&evm, Some(EVM_ZERO_ADDRESS), None, None));
        assert!(is_native_asset(
            &evm,
            Some("0x1111111111111111111111111111111111111111"),
            Some("eth"),
            None
        ));
        assert!(!is_native_asset(
            &evm,
            Some("0x1111111111111111111111111111111111111111"),
            Some("USDC"),
            None
        ));

        assert!(is_native_asset(&sol, Some(WRAPPED_SOL_MINT), None, None));
        assert!(is_native_asset(
            &sol,
            Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            Some("sol"),
            None
        ));
        assert!(!is_native_asset(
            &sol,
            Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            Some("USDC"),
            None
        ));
    }

    #[test]
    fn test_native_symbol_override_for_renamed_tickers() {
        let polygon = ChainId::Evm(137);
        let address = Some("0x1111111111111111111111111111111111111111");

        // Without the override, POL does not match the family default
        assert!(!is_native_asset(&polygon, address, Some("POL"), None));
        // With the per-chain override it is the native asset
        assert!(is_native_asset(&polygon, address, Some("POL"), Some("POL")));
        assert!(is_native_asset(&polygon, address, Some("pol"), Some("POL")));
        // The override replaces, not extends, the default
        assert!(!is_native_asset(&polygon, address, Some("ETH"), Some("POL")));
    }
}
