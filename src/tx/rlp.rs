//! Recursive Length Prefix (RLP) codec
//!
//! Ethereum's canonical binary serialization, used here for EIP-1559
//! transaction payloads. Byte-twiddling is confined to this module so the
//! encode/decode symmetry can be tested in isolation.
//!
//! Encoding rules:
//! - a single byte below 0x80 encodes as itself
//! - a byte string of 0..=55 bytes: `0x80 + len` prefix, then the bytes
//! - longer strings: `0xb7 + len_of_len`, big-endian length, then the bytes
//! - lists use the same scheme shifted to `0xc0` / `0xf7`
//! - integers are minimal big-endian byte strings; zero is the empty string

/// A decoded RLP item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    Bytes(Vec<u8>),
    List(Vec<RlpItem>),
}

impl RlpItem {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RlpItem]> {
        match self {
            Self::Bytes(_) => None,
            Self::List(items) => Some(items),
        }
    }

    /// Interpret a byte item as a big-endian unsigned integer
    pub fn as_u128(&self) -> Option<u128> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 16 {
            return None;
        }
        let mut value = 0u128;
        for &b in bytes {
            value = (value << 8) | b as u128;
        }
        Some(value)
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_u128().and_then(|v| u64::try_from(v).ok())
    }
}

/// Error decoding an RLP payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RlpError {
    #[error("unexpected end of RLP input")]
    UnexpectedEof,
    #[error("non-canonical RLP length encoding")]
    NonCanonical,
    #[error("trailing bytes after RLP item")]
    TrailingBytes,
}

/// Encode a byte string
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    match bytes {
        [b] if *b < 0x80 => vec![*b],
        _ => {
            let mut out = encode_length(bytes.len(), 0x80);
            out.extend_from_slice(bytes);
            out
        }
    }
}

/// Encode an unsigned integer as a minimal big-endian byte string
pub fn encode_u128(value: u128) -> Vec<u8> {
    encode_bytes(&to_be_trimmed(value))
}

pub fn encode_u64(value: u64) -> Vec<u8> {
    encode_u128(value as u128)
}

/// Encode a list from already-encoded element payloads
pub fn encode_list(encoded_items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = encoded_items.iter().map(Vec::len).sum();
    let mut out = encode_length(payload_len, 0xc0);
    for item in encoded_items {
        out.extend_from_slice(item);
    }
    out
}

fn encode_length(len: usize, offset: u8) -> Vec<u8> {
    if len <= 55 {
        vec![offset + len as u8]
    } else {
        let len_bytes = to_be_trimmed(len as u128);
        let mut out = vec![offset + 55 + len_bytes.len() as u8];
        out.extend_from_slice(&len_bytes);
        out
    }
}

/// Big-endian bytes with leading zeros stripped; zero is the empty string
fn to_be_trimmed(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

/// Decode a complete RLP payload into a single item
///
/// Fails on truncated input, non-canonical length encodings and trailing
/// bytes.
pub fn decode(input: &[u8]) -> Result<RlpItem, RlpError> {
    let (item, consumed) = decode_at(input)?;
    if consumed != input.len() {
        return Err(RlpError::TrailingBytes);
    }
    Ok(item)
}

fn decode_at(input: &[u8]) -> Result<(RlpItem, usize), RlpError> {
    let &prefix = input.first().ok_or(RlpError::UnexpectedEof)?;
    match prefix {
        0x00..=0x7f => Ok((RlpItem::Bytes(vec![prefix]), 1)),
        0x80..=0xbf => {
            let (payload, consumed) = decode_payload(input, 0x80)?;
            if payload.len() == 1 && payload[0] < 0x80 {
                // Should have been encoded as a single byte
                return Err(RlpError::NonCanonical);
            }
            Ok((RlpItem::Bytes(payload.to_vec()), consumed))
        }
        0xc0..=0xff => {
            let (payload, consumed) = decode_payload(input, 0xc0)?;
            let mut items = Vec::new();
            let mut offset = 0;
            while offset < payload.len() {
                let (item, used) = decode_at(&payload[offset..])?;
                items.push(item);
                offset += used;
            }
            Ok((RlpItem::List(items), consumed))
        }
    }
}

/// Extract the payload slice following a string/list prefix
///
/// Returns the payload and the total bytes consumed including the prefix.
fn decode_payload(input: &[u8], offset: u8) -> Result<(&[u8], usize), RlpError> {
    let prefix = input[0] - offset;
    if prefix <= 55 {
        let len = prefix as usize;
        let payload = input.get(1..1 + len).ok_or(RlpError::UnexpectedEof)?;
        Ok((payload, 1 + len))
    } else {
        let len_of_len = (prefix - 55) as usize;
        let len_bytes = input.get(1..1 + len_of_len).ok_or(RlpError::UnexpectedEof)?;
        if len_bytes.first() == Some(&0) {
            return Err(RlpError::NonCanonical);
        }
        let mut len = 0usize;
        for &b in len_bytes {
            len = len.checked_mul(256).ok_or(RlpError::NonCanonical)? + b as usize;
        }
        if len <= 55 {
            return Err(RlpError::NonCanonical);
        }
        let start = 1 + len_of_len;
        let payload = input.get(start..start + len).ok_or(RlpError::UnexpectedEof)?;
        Ok((payload, start + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vectors() {
        // Canonical vectors from the Ethereum wiki
        assert_eq!(encode_bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);
        assert_eq!(encode_bytes(b""), vec![0x80]);
        assert_eq!(encode_bytes(&[0x00]), vec![0x00]);
        assert_eq!(encode_bytes(&[0x0f]), vec![0x0f]);
        assert_eq!(encode_bytes(&[0x04, 0x00]), vec![0x82, 0x04, 0x00]);
        assert_eq!(encode_u64(0), vec![0x80]);
        assert_eq!(encode_u64(15), vec![0x0f]);
        assert_eq!(encode_u64(1024), vec![0x82, 0x04, 0x00]);

        // ["cat", "dog"]
        let list = encode_list(&[encode_bytes(b"cat"), encode_bytes(b"dog")]);
        assert_eq!(
            list,
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
        // Empty list
        assert_eq!(encode_list(&[]), vec![0xc0]);
    }

    #[test]
    fn test_long_string_prefix() {
        let payload = vec![0xab; 56];
        let encoded = encode_bytes(&payload);
        assert_eq!(encoded[0], 0xb8);
        assert_eq!(encoded[1], 56);
        assert_eq!(decode(&encoded).unwrap(), RlpItem::Bytes(payload));
    }

    #[test]
    fn test_nested_list_round_trip() {
        let inner = encode_list(&[encode_u64(1), encode_u64(2)]);
        let outer = encode_list(&[encode_bytes(b"hi"), inner]);
        let decoded = decode(&outer).unwrap();
        let items = decoded.as_list().unwrap();
        assert_eq!(items[0], RlpItem::Bytes(b"hi".to_vec()));
        let nested = items[1].as_list().unwrap();
        assert_eq!(nested[0].as_u64(), Some(1));
        assert_eq!(nested[1].as_u64(), Some(2));
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert_eq!(decode(&[0x83, b'd', b'o']), Err(RlpError::UnexpectedEof));
        assert_eq!(decode(&[]), Err(RlpError::UnexpectedEof));
        assert_eq!(
            decode(&[0x80, 0x01]),
            Err(RlpError::TrailingBytes)
        );
    }

    #[test]
    fn test_decode_rejects_non_canonical() {
        // Single byte below 0x80 must encode as itself, not 0x81-prefixed
        assert_eq!(decode(&[0x81, 0x05]), Err(RlpError::NonCanonical));
        // Long-form length for a short payload
        let mut bad = vec![0xb8, 0x01];
        bad.push(0xff);
        assert_eq!(decode(&bad), Err(RlpError::NonCanonical));
    }

    proptest! {
        #[test]
        fn prop_u128_round_trips(value: u128) {
            let encoded = encode_u128(value);
            let decoded = decode(&encoded).unwrap();
            prop_assert_eq!(decoded.as_u128(), Some(value));
        }

        #[test]
        fn prop_bytes_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..200)) {
            let encoded = encode_bytes(&bytes);
            let decoded = decode(&encoded).unwrap();
            prop_assert_eq!(decoded, RlpItem::Bytes(bytes));
        }
    }
}
