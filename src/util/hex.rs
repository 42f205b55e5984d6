//! # Hex Encoding/Decoding Utilities
//!
//! Enhanced hex encoding and decoding used throughout the decoder for
//! telegram input, canonical DIF/VIF keys and diagnostics.
//!
//! Telegram hex as found in driver test vectors and meter logs often embeds
//! visual separators (`|` around the telegram, `_` and `#` marking the start
//! of the encrypted region, plain whitespace). `decode_telegram_hex` strips
//! those before applying the strict check, so the same strings can be pasted
//! straight into a decode request.

use crate::error::DecodeError;
use thiserror::Error;

/// Errors that can occur during hex operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Invalid hex character: {0}")]
    InvalidCharacter(char),

    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,
}

/// Encode bytes to lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Encode bytes to uppercase hex string.
///
/// Canonical DIF/VIF keys use the uppercase form.
pub fn encode_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Decode a hex string to bytes.
///
/// Accepts both cases; plain whitespace is stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    decode_with_separators(hex_str, |c| c.is_whitespace())
}

/// Decode telegram hex, tolerating the separator characters that appear in
/// driver test vectors: whitespace, `|`, `_` and `#`.
pub fn decode_telegram_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    decode_with_separators(hex_str, |c| {
        c.is_whitespace() || c == '|' || c == '_' || c == '#'
    })
}

fn decode_with_separators(
    hex_str: &str,
    is_separator: impl Fn(char) -> bool,
) -> Result<Vec<u8>, HexError> {
    let mut cleaned = String::with_capacity(hex_str.len());
    for c in hex_str.chars() {
        if is_separator(c) {
            continue;
        }
        if !c.is_ascii_hexdigit() {
            return Err(HexError::InvalidCharacter(c));
        }
        cleaned.push(c);
    }

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|_| HexError::OddLength(cleaned.len()))
}

impl From<HexError> for DecodeError {
    fn from(_: HexError) -> Self {
        DecodeError::InvalidHexString
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let data = vec![0x68, 0x31, 0x31, 0x68, 0x08, 0x00, 0x72, 0x45];
        let encoded = encode_hex(&data);
        let decoded = decode_hex(&encoded).unwrap();
        assert_eq!(data, decoded);
    }

    #[test]
    fn test_decode_with_whitespace() {
        let hex = "68 31 31 68";
        let expected = vec![0x68, 0x31, 0x31, 0x68];
        assert_eq!(decode_hex(hex).unwrap(), expected);
    }

    #[test]
    fn test_telegram_separators() {
        let hex = "|2A44_2D2C#99|";
        assert_eq!(
            decode_telegram_hex(hex).unwrap(),
            vec![0x2A, 0x44, 0x2D, 0x2C, 0x99]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(decode_hex(""), Err(HexError::EmptyString)));
        assert!(matches!(decode_hex("1"), Err(HexError::OddLength(1))));
        assert!(matches!(
            decode_hex("GG"),
            Err(HexError::InvalidCharacter('G'))
        ));
        // Separators are not hex digits for the plain decoder.
        assert!(decode_hex("2A_44").is_err());
    }

    #[test]
    fn test_uppercase_keys() {
        assert_eq!(encode_hex_upper(&[0x02, 0xFF, 0x20]), "02FF20");
    }
}
