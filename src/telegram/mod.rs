//! # Telegram Header Parsing
//!
//! A `Telegram` owns one inbound frame and carries it through the decode
//! pipeline: link-layer header, optional extended link layer (ELL), optional
//! transport layer (TPL), payload decryption, and the DIF/VIF walk.
//!
//! Addresses accumulate along the way: one from the data-link layer and
//! optionally a second from a long TPL header when a radio converter relays
//! for the actual meter. Both are retained; the last one is the meter
//! identity used for driver detection and cache keying.
//!
//! Offsets into the owned frame vector are plain integer indices; after
//! decryption the plaintext replaces the encrypted slice in place so all
//! downstream parsing sees one contiguous buffer.

pub mod crypto;

use std::collections::BTreeMap;

use crate::constants::*;
use crate::error::DecodeError;
use crate::logging::log_payload;
use crate::payload::dv::{parse_dv, DvEntry};
use crate::util::hex::encode_hex;
use crypto::{crc16_en13757, decrypt_aes_cbc, process_aes_ctr, AesKey};

/// Link-layer format of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Wmbus,
    Mbus,
}

/// Direction of a frame on the bus. The decoding core only consumes
/// meter-originated traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FromMeter,
    ToMeter,
}

/// Where a frame came from, as reported by the collaborator that deframed
/// it (e.g. `rtlwmbus[0]`).
#[derive(Debug, Clone)]
pub struct AboutTelegram {
    pub source: String,
    pub rssi_dbm: Option<i32>,
    pub format: FrameFormat,
    pub direction: Direction,
}

impl AboutTelegram {
    pub fn new(format: FrameFormat) -> Self {
        AboutTelegram {
            source: String::new(),
            rssi_dbm: None,
            format,
            direction: Direction::FromMeter,
        }
    }
}

/// A meter identity as carried in link- or transport-layer headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub manufacturer: u16,
    pub id: String,
    pub version: u8,
    pub device_type: u8,
}

impl Address {
    /// The three-letter manufacturer code, e.g. `KAM`.
    pub fn manufacturer_str(&self) -> String {
        manufacturer_name(self.manufacturer)
    }

    /// Human-readable media for the device-type byte.
    pub fn media(&self) -> &'static str {
        media_name(self.device_type)
    }
}

/// Unpack a two-byte manufacturer code into its three base-32 letters.
pub fn manufacturer_name(code: u16) -> String {
    let letters = [
        ((code >> 10) & 0x1F) as u8 + 64,
        ((code >> 5) & 0x1F) as u8 + 64,
        (code & 0x1F) as u8 + 64,
    ];
    letters.iter().map(|b| *b as char).collect()
}

/// EN 13757 media table for the device-type byte.
pub fn media_name(device_type: u8) -> &'static str {
    match device_type {
        0x00 => "other",
        0x01 => "oil",
        0x02 => "electricity",
        0x03 => "gas",
        0x04 => "heat",
        0x05 => "steam",
        0x06 => "warm water",
        0x07 => "water",
        0x08 => "heat cost allocation",
        0x09 => "compressed air",
        0x0A | 0x0B => "cooling",
        0x0C => "heat",
        0x0D => "heat/cooling",
        0x0E => "bus/system component",
        0x15 => "hot water",
        0x16 => "cold water",
        0x17 => "dual water",
        0x18 => "pressure",
        0x19 => "a/d converter",
        0x1A => "smoke detector",
        0x1B => "room sensor",
        0x1C => "gas detector",
        0x20 => "breaker",
        0x21 => "valve",
        0x25 => "customer unit",
        0x28 => "waste water",
        0x29 => "garbage",
        0x31 => "communication controller",
        0x32 => "unidirectional repeater",
        0x33 => "bidirectional repeater",
        0x36 => "radio converter (system side)",
        0x37 => "radio converter (meter side)",
        _ => "unknown",
    }
}

/// TPL security mode from the configuration word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TplSecurityMode {
    None,
    /// Mode 5, AES-CBC with IV derived from address and access number.
    AesCbcIv,
    /// Mode 7, AES-CBC with an all-zero IV.
    AesCbcNoIv,
    /// Any other mode value; handled like an unknown cipher.
    Other(u8),
}

/// ELL security taken from the session-number encryption bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EllSecurityMode {
    None,
    AesCtr,
    Reserved(u8),
}

/// Which slice of the frame still needs the decryptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncryptedRegion {
    None,
    /// ELL payload starting at its CRC field.
    Ell { crc_pos: usize },
    /// TPL payload following the configuration word.
    Tpl { payload_pos: usize },
}

/// One inbound telegram on its way from raw bytes to extracted fields.
#[derive(Debug)]
pub struct Telegram {
    /// The frame bytes; the encrypted slice is replaced by plaintext in
    /// place during decryption.
    pub frame: Vec<u8>,
    pub about: AboutTelegram,
    pub addresses: Vec<Address>,

    dll_mfct_bytes: [u8; 2],
    dll_a: [u8; 6],
    tpl_mfct_bytes: [u8; 2],
    tpl_a: [u8; 6],
    tpl_id_found: bool,

    pub tpl_ci: Option<u8>,
    pub tpl_acc: u8,
    pub tpl_sts: u8,
    pub tpl_cfg: u16,
    pub tpl_sec_mode: TplSecurityMode,
    pub tpl_num_encr_blocks: u8,

    pub ell_cc: u8,
    pub ell_acc: u8,
    ell_sn_bytes: [u8; 4],
    pub ell_sec_mode: EllSecurityMode,

    region: EncryptedRegion,
    /// First byte after all headers; the application records start here.
    header_size: usize,
    /// Payload is manufacturer specific (CI 0xA0-0xB7): no DV walk, the
    /// driver parses it by absolute offsets.
    pub mfct_payload: bool,

    pub decryption_failed: bool,
    pub entries: BTreeMap<String, DvEntry>,
    understood_payload: usize,
    pub walk_halted_at: Option<usize>,
}

impl Telegram {
    pub fn new(about: AboutTelegram, frame: Vec<u8>) -> Telegram {
        Telegram {
            frame,
            about,
            addresses: Vec::new(),
            dll_mfct_bytes: [0; 2],
            dll_a: [0; 6],
            tpl_mfct_bytes: [0; 2],
            tpl_a: [0; 6],
            tpl_id_found: false,
            tpl_ci: None,
            tpl_acc: 0,
            tpl_sts: 0,
            tpl_cfg: 0,
            tpl_sec_mode: TplSecurityMode::None,
            tpl_num_encr_blocks: 0,
            ell_cc: 0,
            ell_acc: 0,
            ell_sn_bytes: [0; 4],
            ell_sec_mode: EllSecurityMode::None,
            region: EncryptedRegion::None,
            header_size: 0,
            mfct_payload: false,
            decryption_failed: false,
            entries: BTreeMap::new(),
            understood_payload: 0,
            walk_halted_at: None,
        }
    }

    /// The identity the meter is looked up by: the transport-layer address
    /// when present, else the link-layer one.
    pub fn id(&self) -> &str {
        self.addresses.last().map_or("", |a| a.id.as_str())
    }

    pub fn media(&self) -> &'static str {
        self.addresses.last().map_or("unknown", |a| a.media())
    }

    /// Parse link-layer, ELL and TPL headers. Does not touch encrypted
    /// content; that needs the key and happens in [`Telegram::decrypt`].
    pub fn parse_header(&mut self) -> Result<(), DecodeError> {
        let ci_offset = match self.about.format {
            FrameFormat::Wmbus => self.parse_wmbus_dll()?,
            FrameFormat::Mbus => self.parse_mbus_dll()?,
        };

        let ci = *self.frame.get(ci_offset).ok_or(DecodeError::HeaderParse)?;
        match ci {
            CI_ELL_SHORT => {
                // CC + ACC, no session number, nothing encrypted.
                if ci_offset + 3 > self.frame.len() {
                    return Err(DecodeError::HeaderParse);
                }
                self.ell_cc = self.frame[ci_offset + 1];
                self.ell_acc = self.frame[ci_offset + 2];
                self.parse_tpl(ci_offset + 3)
            }
            CI_ELL_LONG => {
                // CC + ACC + SN(4), then the payload CRC and (possibly
                // encrypted) content.
                if ci_offset + 7 + 2 > self.frame.len() {
                    return Err(DecodeError::HeaderParse);
                }
                self.ell_cc = self.frame[ci_offset + 1];
                self.ell_acc = self.frame[ci_offset + 2];
                self.ell_sn_bytes
                    .copy_from_slice(&self.frame[ci_offset + 3..ci_offset + 7]);
                let sn = u32::from_le_bytes(self.ell_sn_bytes);
                self.ell_sec_mode = match (sn >> 29) & 0x7 {
                    0 => EllSecurityMode::None,
                    1 => EllSecurityMode::AesCtr,
                    other => EllSecurityMode::Reserved(other as u8),
                };
                self.region = EncryptedRegion::Ell {
                    crc_pos: ci_offset + 7,
                };
                // Inner CI is parsed after the ELL payload is resolved.
                self.header_size = ci_offset + 7;
                Ok(())
            }
            _ => self.parse_tpl(ci_offset),
        }
    }

    fn parse_wmbus_dll(&mut self) -> Result<usize, DecodeError> {
        if self.frame.len() < 11 {
            return Err(DecodeError::HeaderParse);
        }
        let f = &self.frame;
        self.dll_mfct_bytes = [f[2], f[3]];
        self.dll_a.copy_from_slice(&f[4..10]);
        let address = Address {
            manufacturer: u16::from_le_bytes([f[2], f[3]]),
            id: bcd_id(&f[4..8]),
            version: f[8],
            device_type: f[9],
        };
        self.addresses.push(address);
        Ok(10)
    }

    fn parse_mbus_dll(&mut self) -> Result<usize, DecodeError> {
        // The frame arrives with the envelope intact but checksum and stop
        // byte already removed: 68 L L 68 C A CI ...
        if self.frame.len() < 7 || self.frame[0] != MBUS_FRAME_LONG_START {
            return Err(DecodeError::HeaderParse);
        }
        let a_field = self.frame[5];
        self.addresses.push(Address {
            manufacturer: 0,
            id: format!("{a_field:02x}"),
            version: 0,
            device_type: 0,
        });
        Ok(6)
    }

    fn parse_tpl(&mut self, ci_offset: usize) -> Result<(), DecodeError> {
        let ci = *self.frame.get(ci_offset).ok_or(DecodeError::HeaderParse)?;
        self.tpl_ci = Some(ci);
        match ci {
            CI_TPL_NONE => {
                self.header_size = ci_offset + 1;
                Ok(())
            }
            CI_TPL_SHORT => {
                if ci_offset + 5 > self.frame.len() {
                    return Err(DecodeError::HeaderParse);
                }
                let f = &self.frame;
                self.tpl_acc = f[ci_offset + 1];
                self.tpl_sts = f[ci_offset + 2];
                let cfg = u16::from_le_bytes([f[ci_offset + 3], f[ci_offset + 4]]);
                self.header_size = ci_offset + 5;
                self.apply_tpl_config(cfg);
                Ok(())
            }
            CI_TPL_LONG => {
                if ci_offset + 13 > self.frame.len() {
                    return Err(DecodeError::HeaderParse);
                }
                let f = &self.frame;
                let id = bcd_id(&f[ci_offset + 1..ci_offset + 5]);
                let mfct = u16::from_le_bytes([f[ci_offset + 5], f[ci_offset + 6]]);
                let version = f[ci_offset + 7];
                let device_type = f[ci_offset + 8];
                self.tpl_mfct_bytes = [f[ci_offset + 5], f[ci_offset + 6]];
                self.tpl_a.copy_from_slice(&f[ci_offset + 1..ci_offset + 7]);
                self.tpl_a[4] = version;
                self.tpl_a[5] = device_type;
                self.tpl_id_found = true;
                self.tpl_acc = f[ci_offset + 9];
                self.tpl_sts = f[ci_offset + 10];
                let cfg = u16::from_le_bytes([f[ci_offset + 11], f[ci_offset + 12]]);
                self.addresses.push(Address {
                    manufacturer: mfct,
                    id,
                    version,
                    device_type,
                });
                self.header_size = ci_offset + 13;
                self.apply_tpl_config(cfg);
                Ok(())
            }
            CI_MFCT_FIRST..=CI_MFCT_LAST => {
                self.mfct_payload = true;
                self.header_size = ci_offset + 1;
                Ok(())
            }
            CI_TPL_COMPACT => Err(DecodeError::UnsupportedCi(ci)),
            other => Err(DecodeError::UnsupportedCi(other)),
        }
    }

    fn apply_tpl_config(&mut self, cfg: u16) {
        self.tpl_cfg = cfg;
        self.tpl_num_encr_blocks = ((cfg >> 4) & 0x0F) as u8;
        self.tpl_sec_mode = match ((cfg >> 8) & 0x1F) as u8 {
            0 => TplSecurityMode::None,
            5 => TplSecurityMode::AesCbcIv,
            7 => TplSecurityMode::AesCbcNoIv,
            other => TplSecurityMode::Other(other),
        };
        if self.tpl_sec_mode != TplSecurityMode::None {
            self.region = EncryptedRegion::Tpl {
                payload_pos: self.header_size,
            };
        }
    }

    /// Resolve the encrypted region of the frame, if any.
    ///
    /// With a key, the ciphertext is decrypted in place and verified; with
    /// no key, a payload that is already plaintext (pre-decrypted test
    /// vectors, repeater output) is accepted and anything else marks the
    /// telegram `decryption_failed`. Never an error: failures are a state
    /// the renderer reports.
    pub fn decrypt(&mut self, key: Option<&AesKey>) -> Result<(), DecodeError> {
        match self.region {
            EncryptedRegion::None => Ok(()),
            EncryptedRegion::Ell { crc_pos } => self.resolve_ell(crc_pos, key),
            EncryptedRegion::Tpl { payload_pos } => {
                self.resolve_tpl(payload_pos, key);
                Ok(())
            }
        }
    }

    fn resolve_ell(&mut self, crc_pos: usize, key: Option<&AesKey>) -> Result<(), DecodeError> {
        if crc_pos + 2 > self.frame.len() {
            return Err(DecodeError::HeaderParse);
        }

        if self.ell_sec_mode == EllSecurityMode::AesCtr {
            if let Some(key) = key {
                let iv = self.ell_iv();
                log_payload("(ELL) decrypting", &self.frame[crc_pos..]);
                process_aes_ctr(key, &iv, &mut self.frame[crc_pos..]);
                log_payload("(ELL) decrypted", &self.frame[crc_pos..]);
            }
        }

        // The payload CRC decides whether the content is readable: it fails
        // on a wrong key, on a missing key for truly encrypted content, and
        // on corruption.
        let stored = u16::from_le_bytes([self.frame[crc_pos], self.frame[crc_pos + 1]]);
        let calculated = crc16_en13757(&self.frame[crc_pos + 2..]);
        if stored != calculated {
            self.decryption_failed = true;
            return Ok(());
        }

        self.frame.drain(crc_pos..crc_pos + 2);
        self.parse_tpl(crc_pos)
    }

    fn ell_iv(&self) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[0..2].copy_from_slice(&self.dll_mfct_bytes);
        iv[2..8].copy_from_slice(&self.dll_a);
        iv[8] = self.ell_cc & ELL_CC_IV_MASK;
        iv[9..13].copy_from_slice(&self.ell_sn_bytes);
        // FN and BC start at zero.
        iv
    }

    fn resolve_tpl(&mut self, payload_pos: usize, key: Option<&AesKey>) {
        let remaining = self.frame.len().saturating_sub(payload_pos);
        if remaining < 2 {
            self.decryption_failed = true;
            return;
        }

        let key = match key {
            Some(k) => k,
            None => {
                // No key configured: accept a payload that is already
                // plaintext, fail anything else.
                if self.frame[payload_pos..payload_pos + 2] != DECRYPT_CHECK_BYTES {
                    self.decryption_failed = true;
                }
                return;
            }
        };

        if let TplSecurityMode::Other(_) = self.tpl_sec_mode {
            // Unknown cipher; the key cannot help.
            if self.frame[payload_pos..payload_pos + 2] != DECRYPT_CHECK_BYTES {
                self.decryption_failed = true;
            }
            return;
        }

        let mut num = if self.tpl_num_encr_blocks > 0 {
            self.tpl_num_encr_blocks as usize * 16
        } else {
            remaining
        };
        if num > remaining {
            log::warn!(
                "(TPL) got {remaining} bytes but {num} were announced as encrypted"
            );
            num = remaining;
        }
        num -= num % 16;
        if num < 16 {
            self.decryption_failed = true;
            return;
        }

        let iv = match self.tpl_sec_mode {
            TplSecurityMode::AesCbcIv => self.tpl_iv(),
            _ => [0u8; 16],
        };

        log_payload("(TPL) decrypting", &self.frame[payload_pos..payload_pos + num]);
        if decrypt_aes_cbc(key, &iv, &mut self.frame[payload_pos..payload_pos + num]).is_err() {
            self.decryption_failed = true;
            return;
        }
        log_payload("(TPL) decrypted", &self.frame[payload_pos..payload_pos + num]);

        if self.frame[payload_pos..payload_pos + 2] != DECRYPT_CHECK_BYTES {
            self.decryption_failed = true;
        }
    }

    fn tpl_iv(&self) -> [u8; 16] {
        let mut iv = [0u8; 16];
        // The TPL identity wins over the link-layer one when present.
        if self.tpl_id_found {
            iv[0..2].copy_from_slice(&self.tpl_mfct_bytes);
            iv[2..8].copy_from_slice(&self.tpl_a);
        } else {
            iv[0..2].copy_from_slice(&self.dll_mfct_bytes);
            iv[2..8].copy_from_slice(&self.dll_a);
        }
        for b in iv[8..16].iter_mut() {
            *b = self.tpl_acc;
        }
        iv
    }

    /// Run the DIF/VIF walker over the payload.
    pub fn walk(&mut self) {
        if self.mfct_payload || self.decryption_failed {
            return;
        }
        let parse = parse_dv(&self.frame[self.header_size..], self.header_size);
        self.understood_payload = parse.understood;
        self.walk_halted_at = parse.halted_at;
        self.entries = parse.entries;
    }

    /// The payload bytes the driver gets to interpret.
    pub fn payload(&self) -> &[u8] {
        &self.frame[self.header_size..]
    }

    /// Offset of the first payload byte inside the frame.
    pub fn payload_offset(&self) -> usize {
        self.header_size
    }

    /// Bytes in the record region.
    pub fn content_bytes(&self) -> usize {
        self.frame.len().saturating_sub(self.header_size)
    }

    /// Bytes of the record region that were explained by the walker or a
    /// driver's content parser. Always `<= content_bytes`.
    pub fn understood_bytes(&self) -> usize {
        self.understood_payload.min(self.content_bytes())
    }

    /// Lets a manufacturer-specific content parser report how much of the
    /// payload it explained.
    pub fn mark_understood(&mut self, bytes: usize) {
        self.understood_payload = self.understood_payload.max(bytes);
    }

    /// A one-line byte map used in `error_analyze`.
    pub fn analyze(&self) -> String {
        let mut s = format!(
            "understood {} of {} content bytes",
            self.understood_bytes(),
            self.content_bytes()
        );
        if let Some(offset) = self.walk_halted_at {
            s.push_str(&format!(", parse halted at offset {offset}"));
        }
        s.push_str(&format!(", frame {}", encode_hex(&self.frame)));
        s
    }
}

/// Decode a little-endian BCD identity into its 8-digit string.
fn bcd_id(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes.iter().rev() {
        s.push(char::from_digit((b >> 4) as u32, 16).unwrap_or('?'));
        s.push(char::from_digit((b & 0xF) as u32, 16).unwrap_or('?'));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex::decode_telegram_hex;

    fn wmbus_telegram(hex: &str) -> Telegram {
        Telegram::new(
            AboutTelegram::new(FrameFormat::Wmbus),
            decode_telegram_hex(hex).unwrap(),
        )
    }

    #[test]
    fn test_manufacturer_name() {
        assert_eq!(manufacturer_name(0x2C2D), "KAM");
        assert_eq!(manufacturer_name(0x6A49), "ZRI");
        assert_eq!(manufacturer_name(0x8601), "APA");
    }

    #[test]
    fn test_wmbus_dll_address() {
        let mut t = wmbus_telegram("19440186313737370408A0A1000059001C270100322DE413B415");
        t.parse_header().unwrap();
        assert_eq!(t.addresses.len(), 1);
        let a = &t.addresses[0];
        assert_eq!(a.id, "37373731");
        assert_eq!(a.manufacturer, 0x8601);
        assert_eq!(a.version, 0x04);
        assert_eq!(a.device_type, 0x08);
        assert_eq!(a.media(), "heat cost allocation");
        assert!(t.mfct_payload);
        assert_eq!(t.payload().len(), 15);
    }

    #[test]
    fn test_ell_header_and_crc_strip() {
        let mut t = wmbus_telegram(
            "2A442D2C998734761B168D2091D37CAC21576C78_02FF207100041308190000441308190000615B7F616713",
        );
        t.parse_header().unwrap();
        assert_eq!(t.ell_sec_mode, EllSecurityMode::AesCtr);
        assert_eq!(t.id(), "76348799");
        // No key: the pre-decrypted content passes the payload CRC.
        t.decrypt(None).unwrap();
        assert!(!t.decryption_failed);
        assert_eq!(t.tpl_ci, Some(0x78));
        t.walk();
        assert!(t.entries.contains_key("02FF20"));
        assert_eq!(t.understood_bytes(), t.content_bytes());
    }

    #[test]
    fn test_ell_crc_mismatch_is_decryption_failure() {
        let mut t = wmbus_telegram(
            "2A442D2C998734761B168D2091D37CAC21576C78_02FF207100041308190000441308190000615B7F616714",
        );
        t.parse_header().unwrap();
        t.decrypt(None).unwrap();
        assert!(t.decryption_failed);
    }

    #[test]
    fn test_long_tpl_header() {
        let mut t = wmbus_telegram(
            "6644496A1064035514377251345015496A0007EE0050052F2F0C1359000000026CBE2B82046CA12B8C0413FFFFFFFF8D0493132CFBFEFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF02FD1700002F2F",
        );
        t.parse_header().unwrap();
        assert_eq!(t.addresses.len(), 2);
        assert_eq!(t.addresses[0].id, "55036410");
        assert_eq!(t.addresses[1].id, "15503451");
        assert_eq!(t.id(), "15503451");
        assert_eq!(t.media(), "water");
        assert_eq!(t.tpl_sec_mode, TplSecurityMode::AesCbcIv);
        assert_eq!(t.tpl_num_encr_blocks, 5);
        assert_eq!(t.tpl_acc, 0xEE);

        // Pre-decrypted payload passes the 2F2F check without a key.
        t.decrypt(None).unwrap();
        assert!(!t.decryption_failed);
        t.walk();
        assert!(t.entries.contains_key("0C13"));
        assert!(t.entries.contains_key("02FD17"));
    }

    #[test]
    fn test_mode5_without_key_and_garbled_payload() {
        let mut t = wmbus_telegram(
            "6644496A1064035514377251345015496A0007EE005005AF2F0C1359000000026CBE2B82046CA12B8C0413FFFFFFFF8D0493132CFBFEFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF02FD1700002F2F",
        );
        t.parse_header().unwrap();
        t.decrypt(None).unwrap();
        assert!(t.decryption_failed);
    }

    #[test]
    fn test_mode5_roundtrip_with_key() {
        // Encrypt a known payload with the mode-5 IV, then decode it back.
        let key = AesKey::from_bytes(&[0x11u8; 16]).unwrap();
        let plain_hex = "2F2F0C1359000000026CBE2B02FD1700002F2F2F2F2F2F2F2F2F2F2F2F2F2F";
        let mut plain = decode_telegram_hex(plain_hex).unwrap();
        assert_eq!(plain.len(), 32);

        // Build the telegram header first to learn the IV.
        let head_hex = "4E44496A1064035514377251345015496A0007EE005005";
        let mut head = decode_telegram_hex(head_hex).unwrap();

        let mut probe = Telegram::new(AboutTelegram::new(FrameFormat::Wmbus), {
            let mut f = head.clone();
            f.extend_from_slice(&plain);
            f
        });
        probe.parse_header().unwrap();
        let iv = probe.tpl_iv();

        // CBC-encrypt the plaintext manually with the block cipher.
        use aes::cipher::{BlockEncrypt, KeyInit};
        let cipher = aes::Aes128::new(aes::cipher::generic_array::GenericArray::from_slice(
            key.as_bytes(),
        ));
        let mut prev = iv;
        for block in plain.chunks_mut(16) {
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            let mut ga = aes::cipher::generic_array::GenericArray::clone_from_slice(block);
            cipher.encrypt_block(&mut ga);
            block.copy_from_slice(&ga);
            prev.copy_from_slice(block);
        }

        head.extend_from_slice(&plain);
        head[0] = (head.len() - 1) as u8;

        let mut t = Telegram::new(AboutTelegram::new(FrameFormat::Wmbus), head);
        t.parse_header().unwrap();
        t.decrypt(Some(&key)).unwrap();
        assert!(!t.decryption_failed, "decryption must recover the 2F2F prefix");
        t.walk();
        assert!(t.entries.contains_key("0C13"));

        // A wrong key must be detected.
        let wrong = AesKey::from_bytes(&[0x12u8; 16]).unwrap();
        let mut original = Telegram::new(AboutTelegram::new(FrameFormat::Wmbus), {
            let mut f = decode_telegram_hex(head_hex).unwrap();
            f.extend_from_slice(&plain);
            f[0] = (f.len() - 1) as u8;
            f
        });
        original.parse_header().unwrap();
        original.decrypt(Some(&wrong)).unwrap();
        assert!(original.decryption_failed);
    }

    #[test]
    fn test_mbus_envelope_header() {
        let mut frame = decode_telegram_hex(
            "68929268080172910245249415010227000000\
             8C1004997500008C1104997500008C2004000000008C2104000000\
             0002FDC9FF01E80002FDDBFF01000002ACFF0101008240ACFF010100\
             02FDC9FF02E80002FDDBFF02000002ACFF0200008240ACFF020000\
             02FDC9FF03E70002FDDBFF03070002ACFF030E008240ACFF030800\
             02FF68010002ACFF000F008240ACFF000A0001FF1300D416",
        )
        .unwrap();
        // Strip checksum and stop byte the way the decode session does.
        frame.truncate(frame.len() - 2);
        let mut t = Telegram::new(AboutTelegram::new(FrameFormat::Mbus), frame);
        t.parse_header().unwrap();
        assert_eq!(t.addresses.len(), 2);
        assert_eq!(t.addresses[0].id, "01");
        assert_eq!(t.id(), "24450291");
        assert_eq!(t.addresses[1].manufacturer, crate::constants::MANUFACTURER_ELT);
        assert_eq!(t.media(), "electricity");
        t.decrypt(None).unwrap();
        t.walk();
        assert!(t.entries.contains_key("8C1004"));
        assert!(t.entries.contains_key("01FF13"));
        assert_eq!(t.understood_bytes(), t.content_bytes());
    }

    #[test]
    fn test_unsupported_ci() {
        // CI 0x79 needs a cross-telegram format cache.
        let mut t = wmbus_telegram("21442D2C776655441B1679CC8C3A20F4307912C40DFF00002F4E00003D010203");
        assert_eq!(t.parse_header(), Err(DecodeError::UnsupportedCi(0x79)));
        // The link-layer address survives for diagnostics.
        assert_eq!(t.id(), "44556677");
    }

    #[test]
    fn test_truncated_header() {
        let mut t = wmbus_telegram("19440186313737");
        assert_eq!(t.parse_header(), Err(DecodeError::HeaderParse));
    }
}
