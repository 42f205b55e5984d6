//! Diehl/Hydrometer Sharky 775 heat meter.
//!
//! Mode-5 encrypted T1 telegrams with a short TPL header. Storage 5 holds
//! the previous billing period totals.

use crate::constants::{MANUFACTURER_DME, MANUFACTURER_HYD};
use crate::meters::registry::{Detection, DriverInfo, LinkMode};
use crate::meters::translate::{Lookup, MapType, Rule};
use crate::meters::{
    DifSignedness, FieldMatcher, Meter, PrintProperties, VifScaling, DEFAULT_PRINT_PROPERTIES,
};
use crate::payload::dv::MeasurementType;
use crate::payload::vif::VifRange;
use crate::units::{Quantity, Unit};

pub(crate) fn driver_info() -> DriverInfo {
    DriverInfo {
        name: "sharky",
        default_fields:
            "name,id,total_energy_consumption_kwh,total_energy_consumption_tariff1_kwh,\
             total_volume_m3,total_volume_tariff2_m3,volume_flow_m3h,power_kw,\
             flow_temperature_c,return_temperature_c,temperature_difference_c,timestamp",
        link_modes: &[LinkMode::T1],
        detections: {
            const DETECTIONS: &[Detection] = &[
                Detection::new(MANUFACTURER_HYD, 0x04, 0x20),
                Detection::new(MANUFACTURER_DME, 0x04, 0x40),
            ];
            DETECTIONS
        },
        constructor,
    }
}

fn constructor(m: &mut Meter) {
    m.add_optional_library_fields("operating_time_h");

    m.add_string_field_with_extractor_and_lookup(
        "status",
        "Status of meter.",
        DEFAULT_PRINT_PROPERTIES | PrintProperties::STATUS,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::ErrorFlags),
        Lookup::new().add(
            Rule::new("ERROR_FLAGS", MapType::BitToString, 0x0000).default_message("OK"),
        ),
    );

    m.add_numeric_field_with_extractor(
        "total_energy_consumption",
        "The total heat energy consumption recorded by this meter.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Energy,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::AnyEnergyVIF),
    );

    m.add_numeric_field_with_extractor(
        "total_energy_consumption_tariff1",
        "The total heat energy consumption recorded by this meter on tariff 1.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Energy,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::AnyEnergyVIF)
            .tariff(1),
    );

    m.add_numeric_field_with_extractor(
        "total_volume",
        "The total heating media volume recorded by this meter.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Volume,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Volume),
    );

    m.add_numeric_field_with_extractor(
        "total_volume_tariff2",
        "The total heating media volume recorded by this meter on tariff 2.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Volume,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Volume)
            .tariff(2),
    );

    m.add_numeric_field_with_extractor(
        "volume_flow",
        "The current heat media volume flow.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Flow,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::VolumeFlow),
    );

    m.add_numeric_field_with_extractor(
        "power",
        "The current power consumption.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Power,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::PowerW),
    );

    m.add_numeric_field_with_extractor(
        "flow_temperature",
        "The current forward heat media temperature.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Temperature,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::FlowTemperature),
    );

    m.add_numeric_field_with_extractor(
        "return_temperature",
        "The current return heat media temperature.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Temperature,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::ReturnTemperature),
    );

    m.add_numeric_field_with_extractor(
        "temperature_difference",
        "The difference between flow and return media temperatures.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Temperature,
        VifScaling::Auto,
        DifSignedness::Signed,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::TemperatureDifference),
    );

    m.add_numeric_field_with_extractor(
        "target_energy_consumption",
        "The total heat energy consumption recorded at the end of the previous billing period.",
        DEFAULT_PRINT_PROPERTIES | PrintProperties::OPTIONAL,
        Quantity::Energy,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::AnyEnergyVIF)
            .storage(5),
    );

    m.add_numeric_field_with_extractor(
        "target_volume",
        "The total heating media volume recorded at the end of the previous billing period.",
        DEFAULT_PRINT_PROPERTIES | PrintProperties::OPTIONAL,
        Quantity::Volume,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Volume)
            .storage(5),
    );

    m.add_numeric_field_with_extractor_and_unit(
        "target",
        "The last billing period end date.",
        DEFAULT_PRINT_PROPERTIES | PrintProperties::OPTIONAL,
        Quantity::PointInTime,
        VifScaling::Auto,
        DifSignedness::Unsigned,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Date)
            .storage(5),
        Unit::DateLT,
    );
}

// Test: Heat sharky 68926025 NOKEY
// telegram=|5E4424232560926820047A370050052F2F0C06512600008C1006000000000C13470315008C2013180000000B3B0000000A2B00000A5A23040A5E81020A62410102FD1700002F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F2F|
// {"media":"heat","meter":"sharky","name":"","id":"68926025","status":"OK","total_energy_consumption_kwh":2651,"total_energy_consumption_tariff1_kwh":0,"total_volume_m3":150.347,"total_volume_tariff2_m3":0.018,"volume_flow_m3h":0,"power_kw":0,"flow_temperature_c":42.3,"return_temperature_c":28.1,"temperature_difference_c":14.1,"timestamp":"1111-11-11T11:11:11Z"}
