//! # mbus-decode - Telegram Decoding for M-Bus and wM-Bus Meters
//!
//! The mbus-decode crate turns raw frames from utility meters (heat,
//! water, gas, electricity, heat-cost allocators) into structured readings:
//! numeric quantities with units, timestamps and status flags.
//!
//! ## Features
//!
//! - Validate wM-Bus and wired M-Bus frame envelopes
//! - Parse link-layer, extended link-layer and transport-layer headers
//! - Decrypt OMS mode 5/7 (AES-CBC) and ELL (AES-CTR) payloads
//! - Walk the DIF/VIF data records into typed entries
//! - Dispatch to per-meter drivers with declarative field extractors
//! - Cache decoding state per meter id and key in a decode session
//! - Render one JSON reading per telegram
//!
//! ## Usage
//!
//! ```rust
//! use mbus_decode::DecoderSession;
//!
//! let mut session = DecoderSession::new();
//! let json = session.decode_line(
//!     r#"{"_":"decode","telegram":"2A442D2C998734761B168D2091D37CAC21576C78_02FF207100041308190000441308190000615B7F616713","key":"NOKEY"}"#,
//! );
//! assert!(json.contains("\"total_m3\":6.408"));
//! ```
//!
//! I/O is the caller's job: serial ports, radio dongles and output
//! transports deliver byte frames in and consume JSON readings out. The
//! core is synchronous and one-way.

pub mod constants;
pub mod decode;
pub mod error;
pub mod frame;
pub mod logging;
pub mod meters;
pub mod payload;
pub mod telegram;
pub mod units;
pub mod util;

pub use crate::error::DecodeError;
pub use crate::logging::{init_logger, log_info};

// Frame validation
pub use frame::{check_mbus_frame, check_wmbus_frame, FrameSlice, FrameStatus};

// Telegram model
pub use telegram::crypto::AesKey;
pub use telegram::{AboutTelegram, Address, FrameFormat, Telegram};

// Data records
pub use payload::{parse_dv, DvEntry, MeasurementType, VifRange};

// Meters and drivers
pub use meters::registry::{registry, DriverInfo, DriverRegistry, LinkMode};
pub use meters::{create_meter, FieldMatcher, Meter, MeterInfo};

// Units
pub use units::{convert, Quantity, Unit};

// Decode sessions
pub use decode::{parse_request, DecodeRequest, DecoderSession};
