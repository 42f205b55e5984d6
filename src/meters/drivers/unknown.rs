//! Fallback driver for meters nothing else detects. Renders headers and
//! the transport-layer status, but no data fields.

use crate::meters::registry::{DriverInfo, LinkMode};
use crate::meters::{Meter, PrintProperties};

pub(crate) fn driver_info() -> DriverInfo {
    DriverInfo {
        name: "unknown",
        default_fields: "name,id,status,timestamp",
        link_modes: &[LinkMode::T1, LinkMode::C1, LinkMode::S1, LinkMode::MBus],
        detections: &[],
        constructor,
    }
}

fn constructor(m: &mut Meter) {
    m.add_string_field(
        "status",
        "Meter status from the telegram header.",
        PrintProperties::JSON
            | PrintProperties::FIELD
            | PrintProperties::STATUS
            | PrintProperties::INCLUDE_TPL_STATUS,
    );
}
