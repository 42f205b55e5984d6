//! # Telegram Decoding Error Handling
//!
//! This module defines the DecodeError enum, which represents the different
//! failure modes of the telegram decoding core. The `Display` strings of the
//! outward-facing variants are stable: they are the exact strings placed in
//! the JSON `error` field of a decode response, so changing them is a
//! protocol break.

use thiserror::Error;

/// Represents the different error types that can occur while decoding a telegram.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// The telegram field contained characters that are not hex digits,
    /// or an odd number of digits after separator stripping.
    #[error("invalid hex string")]
    InvalidHexString,

    /// The hex string passed the strict check but could not be converted.
    #[error("failed to decode hex telegram")]
    HexDecode,

    /// Truncated or malformed link-layer, extended-link-layer or
    /// transport-layer header.
    #[error("failed to parse telegram header")]
    HeaderParse,

    /// The CI byte identifies a transport format this core does not decode.
    #[error("unsupported CI field 0x{0:02X}")]
    UnsupportedCi(u8),

    /// Decrypted plaintext failed verification (missing 2F2F prefix or
    /// payload CRC mismatch), or the encrypted region was malformed.
    #[error("decryption failed, please check key")]
    DecryptionFailed,

    /// The DIF/VIF walker or the field extraction stage rejected the payload.
    #[error("decoding failed")]
    DecodingFailed,

    /// The driver constructor rejected the meter configuration.
    #[error("failed to create meter")]
    CreateMeter,

    /// The configured AES key is not 16 bytes.
    #[error("invalid key length: expected 16 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The decode request line could not be parsed in any supported
    /// content type (JSON, XMQ, XML).
    #[error("invalid decode request: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_error_strings() {
        // These strings are part of the decode response protocol.
        assert_eq!(DecodeError::InvalidHexString.to_string(), "invalid hex string");
        assert_eq!(
            DecodeError::HexDecode.to_string(),
            "failed to decode hex telegram"
        );
        assert_eq!(
            DecodeError::HeaderParse.to_string(),
            "failed to parse telegram header"
        );
        assert_eq!(
            DecodeError::DecryptionFailed.to_string(),
            "decryption failed, please check key"
        );
        assert_eq!(DecodeError::DecodingFailed.to_string(), "decoding failed");
        assert_eq!(DecodeError::CreateMeter.to_string(), "failed to create meter");
    }
}
