//! # Payload Decryption
//!
//! AES-128 decryption of telegram payloads according to OMS 7.2.4:
//!
//! - **Mode 5** (TPL, AES-CBC with IV): IV = manufacturer(2) ‖ address(6) ‖
//!   access-nr repeated 8 times. The number of encrypted bytes is
//!   `num_encrypted_blocks × 16`; plaintext must begin `2F 2F`.
//! - **Mode 7** (TPL, AES-CBC without IV): all-zero IV, same block rule.
//! - **ELL** (AES-CTR): IV = manufacturer(2) ‖ address(6) ‖ CC (hop-count
//!   and repeated-access bits masked out) ‖ SN(4) ‖ FN(2) ‖ BC(1), with the
//!   block counter incremented per 16-byte block. The trailing block may be
//!   shorter than 16 bytes.
//!
//! All operations work on caller-provided buffers; the only allocations are
//! the 16-byte round blocks.

use aes::cipher::{
    block_padding::NoPadding, generic_array::GenericArray, BlockDecryptMut, BlockEncrypt, KeyInit,
    KeyIvInit,
};
use aes::Aes128;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::DecodeError;
use crate::util::hex::decode_hex;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Errors from the decryption primitives.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CryptoError {
    #[error("invalid key length: expected 16, got {0}")]
    InvalidKeyLength(usize),

    #[error("encrypted region must be a multiple of 16 bytes, got {0}")]
    InvalidDataLength(usize),
}

impl From<CryptoError> for DecodeError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidKeyLength(n) => DecodeError::InvalidKeyLength(n),
            CryptoError::InvalidDataLength(_) => DecodeError::DecryptionFailed,
        }
    }
}

/// AES-128 key for telegram decryption. Zeroized on drop.
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct AesKey {
    key: [u8; 16],
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keys never end up in logs.
        write!(f, "AesKey(****)")
    }
}

impl AesKey {
    /// Create an AES key from a 16-byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 16 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Create an AES key from 32 hex digits.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes =
            decode_hex(hex_str).map_err(|_| CryptoError::InvalidKeyLength(hex_str.len() / 2))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.key
    }
}

/// Decrypt `buf` in place with AES-128-CBC. `buf` must be a multiple of the
/// block size.
pub fn decrypt_aes_cbc(key: &AesKey, iv: &[u8; 16], buf: &mut [u8]) -> Result<(), CryptoError> {
    if buf.is_empty() || buf.len() % 16 != 0 {
        return Err(CryptoError::InvalidDataLength(buf.len()));
    }
    let dec = Aes128CbcDec::new_from_slices(&key.key, iv)
        .map_err(|_| CryptoError::InvalidKeyLength(key.key.len()))?;
    let buf_len = buf.len();
    dec.decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| CryptoError::InvalidDataLength(buf_len))?;
    Ok(())
}

/// Process `buf` in place with AES-128-CTR.
///
/// Encryption and decryption are the same operation: each counter block is
/// ECB-encrypted into a keystream block and xored into the data. The final
/// block is truncated to the remaining length.
pub fn process_aes_ctr(key: &AesKey, iv: &[u8; 16], buf: &mut [u8]) {
    let cipher = Aes128::new(GenericArray::from_slice(&key.key));
    let mut counter = *iv;

    for chunk in buf.chunks_mut(16) {
        let mut keystream = GenericArray::clone_from_slice(&counter);
        cipher.encrypt_block(&mut keystream);
        for (b, k) in chunk.iter_mut().zip(keystream.iter()) {
            *b ^= k;
        }
        increment_iv(&mut counter);
    }
}

fn increment_iv(iv: &mut [u8; 16]) {
    for b in iv.iter_mut().rev() {
        let (v, carry) = b.overflowing_add(1);
        *b = v;
        if !carry {
            break;
        }
    }
}

/// CRC-16/EN-13757 over `data`, used for the ELL payload CRC.
pub fn crc16_en13757(data: &[u8]) -> u16 {
    let mut state = crc16::State::<crc16::EN_13757>::new();
    state.update(data);
    state.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_hex() {
        let key = AesKey::from_hex("000102030405060708090A0B0C0D0E0F").unwrap();
        assert_eq!(key.as_bytes()[0], 0x00);
        assert_eq!(key.as_bytes()[15], 0x0F);
        assert!(AesKey::from_hex("0011").is_err());
        assert!(AesKey::from_bytes(&[0u8; 15]).is_err());
    }

    #[test]
    fn test_cbc_requires_block_multiple() {
        let key = AesKey::from_bytes(&[0u8; 16]).unwrap();
        let mut buf = [0u8; 15];
        assert!(matches!(
            decrypt_aes_cbc(&key, &[0u8; 16], &mut buf),
            Err(CryptoError::InvalidDataLength(15))
        ));
    }

    #[test]
    fn test_ctr_roundtrip_with_partial_block() {
        let key = AesKey::from_bytes(&[0x42u8; 16]).unwrap();
        let iv = [0x17u8; 16];
        let original: Vec<u8> = (0u8..40).collect();
        let mut buf = original.clone();
        process_aes_ctr(&key, &iv, &mut buf);
        assert_ne!(buf, original);
        process_aes_ctr(&key, &iv, &mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_ctr_blocks_use_distinct_keystream() {
        let key = AesKey::from_bytes(&[0x42u8; 16]).unwrap();
        let iv = [0u8; 16];
        let mut buf = [0u8; 32];
        process_aes_ctr(&key, &iv, &mut buf);
        assert_ne!(buf[..16], buf[16..]);
    }

    #[test]
    fn test_increment_iv_carries() {
        let mut iv = [0u8; 16];
        iv[15] = 0xFF;
        increment_iv(&mut iv);
        assert_eq!(iv[15], 0x00);
        assert_eq!(iv[14], 0x01);
    }

    #[test]
    fn test_crc16_en13757_vector() {
        // Payload CRC of a live Kamstrup C1 telegram.
        let payload = crate::util::hex::decode_telegram_hex(
            "7802FF207100041308190000441308190000615B7F616713",
        )
        .unwrap();
        assert_eq!(crc16_en13757(&payload), 0x6C57);
    }
}
