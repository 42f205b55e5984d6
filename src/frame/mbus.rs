//! # Wired M-Bus Frame Validation
//!
//! Validates the EN 13757-2 frame envelopes:
//!
//! ```text
//! Long frame:  0x68 | L | L | 0x68 | C | A | CI | data | CS | 0x16
//! Short frame: 0x10 | C | A | CS | 0x16
//! Ack:         0xE5
//! ```
//!
//! The length field must repeat; CS is the arithmetic sum modulo 256 of the
//! bytes between the second `0x68` and the checksum itself. The checker
//! reports the content slice so the caller can drop CS and the stop byte
//! before handing the frame downstream.

use super::{FrameSlice, FrameStatus};
use crate::constants::{MBUS_FRAME_LONG_START, MBUS_FRAME_SHORT_START, MBUS_FRAME_STOP};
use nom::number::complete::be_u8;
use nom::IResult;

/// Check whether `buf` starts with a complete wired M-Bus frame.
pub fn check_mbus_frame(buf: &[u8]) -> FrameStatus {
    match buf.first() {
        None => FrameStatus::Partial,
        Some(&MBUS_FRAME_LONG_START) => check_long_frame(buf),
        Some(&MBUS_FRAME_SHORT_START) => check_short_frame(buf),
        Some(_) => FrameStatus::Error,
    }
}

fn check_long_frame(buf: &[u8]) -> FrameStatus {
    match parse_long_envelope(buf) {
        Ok((_, status)) => status,
        Err(nom::Err::Incomplete(_)) => FrameStatus::Partial,
        Err(_) => {
            if buf.len() < 4 {
                FrameStatus::Partial
            } else {
                FrameStatus::Error
            }
        }
    }
}

fn parse_long_envelope(buf: &[u8]) -> IResult<&[u8], FrameStatus> {
    let (i, _start1) = be_u8(buf)?;
    let (i, len1) = be_u8(i)?;
    let (i, len2) = be_u8(i)?;
    let (i, start2) = be_u8(i)?;

    if len1 != len2 || start2 != MBUS_FRAME_LONG_START || len1 < 3 {
        return Ok((i, FrameStatus::Error));
    }

    let l = len1 as usize;
    let total = 4 + l + 2;
    if buf.len() < total {
        return Ok((i, FrameStatus::Partial));
    }

    let content = &buf[4..4 + l];
    let checksum: u8 = content.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if checksum != buf[4 + l] || buf[5 + l] != MBUS_FRAME_STOP {
        return Ok((i, FrameStatus::Error));
    }

    Ok((
        i,
        FrameStatus::Full(FrameSlice {
            frame_length: total,
            payload_len: 4 + l,
            payload_offset: 4,
        }),
    ))
}

fn check_short_frame(buf: &[u8]) -> FrameStatus {
    if buf.len() < 5 {
        return FrameStatus::Partial;
    }
    let checksum = buf[1].wrapping_add(buf[2]);
    if checksum != buf[3] || buf[4] != MBUS_FRAME_STOP {
        return FrameStatus::Error;
    }
    FrameStatus::Full(FrameSlice {
        frame_length: 5,
        payload_len: 3,
        payload_offset: 1,
    })
}
