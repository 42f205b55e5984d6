//! Zenner Minomess water meter.
//!
//! Radio telegrams arrive through a radio converter (meter side) with a
//! long TPL header and mode-5 encryption; wired M-Bus telegrams carry four
//! historical totals. The wM-Bus telegram stores the monthly target in
//! storage 8, the wired one in storage 1.

use crate::constants::MANUFACTURER_ZRI;
use crate::meters::registry::{Detection, DriverInfo, LinkMode};
use crate::meters::translate::{Lookup, MapType, Rule};
use crate::meters::{
    DifSignedness, FieldMatcher, Meter, PrintProperties, VifScaling,
};
use crate::payload::dv::MeasurementType;
use crate::payload::vif::VifRange;
use crate::units::Quantity;

pub(crate) fn driver_info() -> DriverInfo {
    DriverInfo {
        name: "minomess",
        default_fields: "name,id,total_m3,target_m3,status,timestamp",
        link_modes: &[LinkMode::C1],
        detections: {
            const DETECTIONS: &[Detection] = &[Detection::new(MANUFACTURER_ZRI, 0x07, 0x00)];
            DETECTIONS
        },
        constructor,
    }
}

fn constructor(m: &mut Meter) {
    m.add_optional_library_fields(
        "meter_date,fabrication_no,operating_time_h,on_time_h,on_time_at_error_h,meter_datetime",
    );
    m.add_optional_library_fields("total_m3,total_backward_m3,volume_flow_m3h");

    // If the meter is recently commissioned, the target consumption
    // registers still hold 0xFFFFFFFF and render as a very large value.
    m.add_numeric_field_with_extractor(
        "target",
        "The total water consumption recorded at the beginning of this month.",
        PrintProperties::JSON
            | PrintProperties::FIELD
            | PrintProperties::IMPORTANT
            | PrintProperties::OPTIONAL,
        Quantity::Volume,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Volume)
            .storage(8),
    );

    m.add_string_field_with_extractor(
        "target_date",
        "Date when target water consumption was recorded.",
        PrintProperties::JSON | PrintProperties::OPTIONAL,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Date)
            .storage(8),
    );

    // The wired M-Bus telegram carries four totals and dates; only nr 1,
    // the latest, is printed.
    m.add_numeric_field_with_extractor(
        "target",
        "The total water consumption recorded at the beginning of this month.",
        PrintProperties::JSON
            | PrintProperties::FIELD
            | PrintProperties::IMPORTANT
            | PrintProperties::OPTIONAL,
        Quantity::Volume,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Volume)
            .storage(1),
    );

    m.add_string_field_with_extractor(
        "target_date",
        "Date when target water consumption was recorded.",
        PrintProperties::JSON | PrintProperties::OPTIONAL,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Date)
            .storage(1),
    );

    // Two status/info bytes; byte A is assumed to be the high byte, the
    // telegram stores the low byte first.
    m.add_string_field_with_extractor_and_lookup(
        "status",
        "Status and error flags.",
        PrintProperties::JSON | PrintProperties::FIELD,
        FieldMatcher::build().difvif("02FD17"),
        Lookup::new().add(
            Rule::new("ERROR_FLAGS", MapType::BitToString, 0xFFFF)
                .default_message("OK")
                .add(0x8000, "WAS_REMOVED")
                .add(0x4000, "WAS_TAMPERED")
                .add(0x2000, "WAS_LEAKING")
                .add(0x1000, "TEMPORARY_ERROR")
                .add(0x0800, "PERMANENT_ERROR")
                .add(0x0400, "BATTERY_EOL")
                .add(0x0200, "ABNORMAL_ERROR")
                .add(0x0080, "BURSTING")
                .add(0x0040, "REMOVED")
                .add(0x0020, "LEAKING")
                .add(0x0010, "WAS_BACKFLOWING")
                .add(0x0008, "BACKFLOWING")
                .add(0x0004, "WAS_BLOCKED")
                .add(0x0002, "UNDERSIZED")
                .add(0x0001, "OVERSIZED"),
        ),
    );
}

// Test: Mino minomess 15503451 NOKEY
// telegram=|6644496A1064035514377251345015496A0007EE0050052F2F0C1359000000026CBE2B82046CA12B8C0413FFFFFFFF8D0493132CFBFEFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF02FD1700002F2F|
// {"media":"water","meter":"minomess","name":"","id":"15503451","meter_date":"2021-11-30","total_m3":0.059,"target_m3":244444.442,"target_date":"2021-11-01","status":"OK","timestamp":"1111-11-11T11:11:11Z"}

// Test: Minowired minomess 57575757 NOKEY
// telegram=|6874746808007257575757496A000712000000_0C7857575757046D2414DE280413000000000C943C000000004413FFFFFFFF426CFFFF840113FFFFFFFF82016CFFFFC40113FFFFFFFFC2016CFFFF840213FFFFFFFF82026CFFFF043B000000000422E62F000004260000000034220000000002FD1700001F5716|
// {"media":"water","meter":"minomess","name":"","id":"57575757","meter_datetime":"2022-08-30 20:36","fabrication_no":"57575757","on_time_h":12262,"on_time_at_error_h":0,"operating_time_h":0,"total_m3":0,"total_backward_m3":0,"volume_flow_m3h":0,"target_m3":4294967.295,"target_date":"2127-15-31","status":"OK","timestamp":"1111-11-11T11:11:11Z"}
