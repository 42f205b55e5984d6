//! # Wireless M-Bus Frame Validation
//!
//! Radio dongles deliver wM-Bus frames with the link-layer CRCs already
//! stripped (frame format A after de-framing): a single L-field followed by
//! L content bytes. The L-field counts every byte after itself.

use super::{FrameSlice, FrameStatus};

/// Check whether `buf` starts with a complete wM-Bus frame.
///
/// The first byte is the total length excluding itself. A zero length can
/// never be a telegram; a buffer shorter than `L + 1` is a partial frame.
pub fn check_wmbus_frame(buf: &[u8]) -> FrameStatus {
    if buf.is_empty() {
        return FrameStatus::Partial;
    }

    let l = buf[0] as usize;
    if l == 0 {
        return FrameStatus::Error;
    }
    // A telegram must at least hold the link-layer header:
    // C(1) M(2) A(4) V(1) T(1) CI(1).
    if l < 10 {
        return FrameStatus::Error;
    }
    if buf.len() < l + 1 {
        return FrameStatus::Partial;
    }

    FrameStatus::Full(FrameSlice {
        frame_length: l + 1,
        payload_len: l + 1,
        payload_offset: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex::decode_telegram_hex;

    #[test]
    fn test_full_frame() {
        let frame =
            decode_telegram_hex("19440186313737370408A0A1000059001C270100322DE413B415").unwrap();
        match check_wmbus_frame(&frame) {
            FrameStatus::Full(slice) => {
                assert_eq!(slice.frame_length, 26);
                assert_eq!(slice.payload_offset, 0);
            }
            other => panic!("expected full frame, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_frame() {
        let frame = [0x19, 0x44, 0x01];
        assert_eq!(check_wmbus_frame(&frame), FrameStatus::Partial);
    }

    #[test]
    fn test_zero_length() {
        assert_eq!(check_wmbus_frame(&[0x00, 0x44]), FrameStatus::Error);
    }

    #[test]
    fn test_too_short_for_header() {
        assert_eq!(check_wmbus_frame(&[0x05, 1, 2, 3, 4, 5]), FrameStatus::Error);
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(check_wmbus_frame(&[]), FrameStatus::Partial);
    }
}
