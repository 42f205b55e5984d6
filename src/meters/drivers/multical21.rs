//! Kamstrup Multical 21 water meter.
//!
//! C1 telegrams with ELL AES-CTR security. The 16-bit status register at
//! `02FF20` packs the error flags in the low nibble and dry/reversed/
//! leaking/bursting durations in the bit groups above.

use crate::meters::registry::{Detection, DriverInfo, LinkMode};
use crate::meters::translate::{Lookup, MapType, Rule};
use crate::meters::{
    DifSignedness, FieldMatcher, Meter, PrintProperties, VifScaling,
};
use crate::constants::MANUFACTURER_KAM;
use crate::payload::dv::MeasurementType;
use crate::payload::vif::VifRange;
use crate::units::Quantity;

pub(crate) fn driver_info() -> DriverInfo {
    DriverInfo {
        name: "multical21",
        default_fields:
            "name,id,total_m3,target_m3,max_flow_m3h,flow_temperature_c,\
             external_temperature_c,status,timestamp",
        link_modes: &[LinkMode::C1],
        detections: {
            const DETECTIONS: &[Detection] = &[
                Detection::new(MANUFACTURER_KAM, 0x06, 0x1B),
                Detection::new(MANUFACTURER_KAM, 0x16, 0x1B),
            ];
            DETECTIONS
        },
        constructor,
    }
}

fn error_flags() -> Rule {
    Rule::new("ERROR_FLAGS", MapType::BitToString, 0x000F)
        .add(0x01, "DRY")
        .add(0x02, "REVERSE")
        .add(0x04, "LEAK")
        .add(0x08, "BURST")
}

fn duration_rule(name: &'static str, mask: u64, step: u64) -> Rule {
    Rule::new(name, MapType::IndexToString, mask)
        .add(0, "")
        .add(step, "1-8 hours")
        .add(2 * step, "9-24 hours")
        .add(3 * step, "2-3 days")
        .add(4 * step, "4-7 days")
        .add(5 * step, "8-14 days")
        .add(6 * step, "15-21 days")
        .add(7 * step, "22-31 days")
}

fn constructor(m: &mut Meter) {
    m.add_string_field_with_extractor_and_lookup(
        "status",
        "Status of meter.",
        PrintProperties::JSON
            | PrintProperties::FIELD
            | PrintProperties::IMPORTANT
            | PrintProperties::STATUS,
        FieldMatcher::build().difvif("02FF20"),
        Lookup::new().add(error_flags().default_message("OK")),
    );

    m.add_numeric_field_with_extractor(
        "total",
        "The total water consumption recorded by this meter.",
        PrintProperties::JSON | PrintProperties::FIELD | PrintProperties::IMPORTANT,
        Quantity::Volume,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Volume),
    );

    m.add_numeric_field_with_extractor(
        "target",
        "The total water consumption recorded at the beginning of this month.",
        PrintProperties::JSON | PrintProperties::FIELD | PrintProperties::IMPORTANT,
        Quantity::Volume,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Volume)
            .storage(1),
    );

    m.add_numeric_field_with_extractor(
        "flow_temperature",
        "The water temperature.",
        PrintProperties::JSON | PrintProperties::FIELD | PrintProperties::OPTIONAL,
        Quantity::Temperature,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Minimum)
            .vif_range(VifRange::FlowTemperature)
            .any_storage(),
    );

    m.add_numeric_field_with_extractor(
        "external_temperature",
        "The external temperature outside of the meter.",
        PrintProperties::JSON | PrintProperties::FIELD | PrintProperties::OPTIONAL,
        Quantity::Temperature,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Any)
            .vif_range(VifRange::ExternalTemperature)
            .any_storage()
            .any_combinables(),
    );

    m.add_numeric_field_with_extractor(
        "min_external_temperature",
        "The lowest external temperature outside of the meter.",
        PrintProperties::JSON | PrintProperties::FIELD | PrintProperties::OPTIONAL,
        Quantity::Temperature,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Minimum)
            .vif_range(VifRange::ExternalTemperature),
    );

    m.add_numeric_field_with_extractor(
        "max_flow",
        "The maximum flow recorded during previous period.",
        PrintProperties::FIELD | PrintProperties::JSON | PrintProperties::OPTIONAL,
        Quantity::Flow,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Maximum)
            .vif_range(VifRange::VolumeFlow)
            .any_storage(),
    );

    m.add_string_field_with_extractor_and_lookup(
        "current_status",
        "Status of meter. This field will go away, use status instead.",
        PrintProperties::JSON
            | PrintProperties::FIELD
            | PrintProperties::IMPORTANT
            | PrintProperties::DEPRECATED,
        FieldMatcher::build().difvif("02FF20"),
        Lookup::new().add(error_flags()),
    );

    m.add_string_field_with_extractor_and_lookup(
        "time_dry",
        "Amount of time the meter has been dry.",
        PrintProperties::JSON,
        FieldMatcher::build().difvif("02FF20"),
        Lookup::new().add(duration_rule("DRY", 0x0070, 0x0010)),
    );

    m.add_string_field_with_extractor_and_lookup(
        "time_reversed",
        "Amount of time the meter has been reversed.",
        PrintProperties::JSON,
        FieldMatcher::build().difvif("02FF20"),
        Lookup::new().add(duration_rule("REVERSED", 0x0380, 0x0080)),
    );

    m.add_string_field_with_extractor_and_lookup(
        "time_leaking",
        "Amount of time the meter has been leaking.",
        PrintProperties::JSON,
        FieldMatcher::build().difvif("02FF20"),
        Lookup::new().add(duration_rule("LEAKING", 0x1C00, 0x0400)),
    );

    m.add_string_field_with_extractor_and_lookup(
        "time_bursting",
        "Amount of time the meter has been bursting.",
        PrintProperties::JSON,
        FieldMatcher::build().difvif("02FF20"),
        Lookup::new().add(duration_rule("BURSTING", 0xE000, 0x2000)),
    );
}

// Test: MyTapWater multical21 76348799 NOKEY
// telegram=|2A442D2C998734761B168D2091D37CAC21576C78_02FF207100041308190000441308190000615B7F616713|
// {"media":"cold water","meter":"multical21","name":"","id":"76348799","status":"DRY","total_m3":6.408,"target_m3":6.408,"flow_temperature_c":127,"external_temperature_c":19,"min_external_temperature_c":19,"current_status":"DRY","time_dry":"22-31 days","time_reversed":"","time_leaking":"","time_bursting":"","timestamp":"1111-11-11T11:11:11Z"}
