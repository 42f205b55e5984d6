//! Link-layer frame validation for wM-Bus and wired M-Bus.
//!
//! The checkers locate a frame inside a byte buffer without mutating it;
//! they only return slice offsets. Stripping (checksum, stop byte) is the
//! caller's job, guided by the returned lengths.

pub mod mbus;
pub mod wmbus;

pub use mbus::check_mbus_frame;
pub use wmbus::check_wmbus_frame;

/// Where a validated frame sits inside the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlice {
    /// Total bytes occupied by the frame, including envelope bytes.
    pub frame_length: usize,
    /// Bytes of the frame that carry protocol content (for wired M-Bus this
    /// excludes the trailing checksum and stop byte).
    pub payload_len: usize,
    /// Offset of the first content byte.
    pub payload_offset: usize,
}

/// Result of scanning a buffer for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A complete, checksum-valid frame.
    Full(FrameSlice),
    /// The buffer ends before the frame does; feed more bytes.
    Partial,
    /// The buffer cannot start a valid frame.
    Error,
}
