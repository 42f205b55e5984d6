//! Shared utilities for the decoding core.

pub mod hex;

pub use hex::{decode_hex, decode_telegram_hex, encode_hex};
