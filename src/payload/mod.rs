//! The payload module contains the DIF/VIF walker and the tables and value
//! codecs it relies on to turn a decrypted telegram payload into data/value
//! entries.

pub mod data;
pub mod dv;
pub mod vif;

pub use dv::{parse_dv, DvEntry, DvParse, MeasurementType};
pub use vif::{vif_unit_and_exponent, Vif, VifRange};
