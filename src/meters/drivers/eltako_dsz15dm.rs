//! Eltako DSZ15DM three-phase electricity meter, wired M-Bus.
//!
//! Per-phase registers are tagged with manufacturer-specific combinable
//! VIFEs: `FF 01`..`FF 03` select the phase, `FF 00` the three-phase total.
//! Reactive registers live on sub-unit 1, energy registers per tariff.

use crate::constants::MANUFACTURER_ELT;
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
        name: "eltako_dsz15dm",
        default_fields: "name,id,total_energy_consumption_tariff_1_kwh,timestamp",
        link_modes: &[LinkMode::MBus],
        detections: {
            const DETECTIONS: &[Detection] = &[Detection::new(MANUFACTURER_ELT, 0x02, 0x01)];
            DETECTIONS
        },
        constructor,
    }
}

fn constructor(m: &mut Meter) {
    m.add_optional_library_fields("firmware_version,manufacturer,meter_datetime,model_version");

    m.add_string_field(
        "status",
        "Status and error flags.",
        PrintProperties::JSON | PrintProperties::FIELD | PrintProperties::STATUS
            | PrintProperties::INCLUDE_TPL_STATUS,
    );

    m.add_string_field_with_extractor_and_lookup(
        "error_flags",
        "Error flags.",
        PrintProperties::INJECT_INTO_STATUS,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::ErrorFlags),
        Lookup::new().add(
            Rule::new("ERROR_FLAGS", MapType::BitToString, 0xFF)
                .add(0x01, "CODE_01_SYS_BUSY")
                .add(0x02, "CODE_02_GENERIC_APPLICATION_ERROR")
                .add(0x04, "CODE_04_CURRENT_LOW")
                .add(0x08, "CODE_08_PERMANENT_ERROR")
                .add(0x10, "CODE_10_TEMPORARY_ERROR"),
        ),
    );

    m.add_numeric_field_with_extractor(
        "total_energy_consumption_tariff_{tariff_counter}",
        "Total cumulative active energy per tariff.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Energy,
        VifScaling::Auto,
        DifSignedness::Signed,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::AnyEnergyVIF)
            .storage(0)
            .tariff_range(1, 2),
    );

    m.add_numeric_field_with_extractor(
        "reactive_energy_consumption_tariff_{tariff_counter}",
        "Total cumulative reactive energy per tariff.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Energy,
        VifScaling::Auto,
        DifSignedness::Signed,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::AnyEnergyVIF)
            .storage(2)
            .tariff_range(1, 2),
    );

    for (phase, raw) in [("l1", 0x7F01u16), ("l2", 0x7F02), ("l3", 0x7F03)] {
        add_phase_fields(m, phase, raw);
    }

    m.add_numeric_field_with_extractor_and_unit(
        "ct_numerator",
        "Current transformer ratio (numerator).",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Dimensionless,
        VifScaling::None,
        DifSignedness::Signed,
        FieldMatcher::build().difvif("02FF68"),
        Unit::Number,
    );

    m.add_numeric_field_with_extractor(
        "active_consumption_total",
        "Instantaneous active power for all phases.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Power,
        VifScaling::Auto,
        DifSignedness::Signed,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::AnyPowerVIF)
            .combinable_raw(0x7F00),
    );

    m.add_numeric_field_with_extractor(
        "reactive_consumption_total",
        "Instantaneous reactive power for all phases.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Power,
        VifScaling::Auto,
        DifSignedness::Signed,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::AnyPowerVIF)
            .subunit(1)
            .combinable_raw(0x7F00),
    );

    m.add_numeric_field_with_extractor_and_unit(
        "active_tariff",
        "Active tariff.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Dimensionless,
        VifScaling::None,
        DifSignedness::Signed,
        FieldMatcher::build().difvif("01FF13"),
        Unit::Number,
    );
}

/// The voltage/current/power registers repeat per phase, distinguished
/// only by the manufacturer combinable.
fn add_phase_fields(m: &mut Meter, phase: &'static str, raw: u16) {
    let (voltage, current, active, reactive) = phase_names(phase);

    m.add_numeric_field_with_extractor(
        voltage,
        "Instantaneous voltage between phase and neutral.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Voltage,
        VifScaling::Auto,
        DifSignedness::Signed,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Voltage)
            .combinable_raw(raw),
    );

    m.add_numeric_field_with_extractor(
        current,
        "Instantaneous current in the phase.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Amperage,
        VifScaling::Auto,
        DifSignedness::Signed,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::Amperage)
            .combinable_raw(raw),
    );

    m.add_numeric_field_with_extractor(
        active,
        "Instantaneous active power for the phase.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Power,
        VifScaling::Auto,
        DifSignedness::Signed,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::AnyPowerVIF)
            .combinable_raw(raw),
    );

    m.add_numeric_field_with_extractor(
        reactive,
        "Instantaneous reactive power for the phase.",
        DEFAULT_PRINT_PROPERTIES,
        Quantity::Power,
        VifScaling::Auto,
        DifSignedness::Signed,
        FieldMatcher::build()
            .measurement(MeasurementType::Instantaneous)
            .vif_range(VifRange::AnyPowerVIF)
            .subunit(1)
            .combinable_raw(raw),
    );
}

fn phase_names(
    phase: &'static str,
) -> (&'static str, &'static str, &'static str, &'static str) {
    match phase {
        "l1" => (
            "voltage_l1_n",
            "current_l1",
            "active_consumption_l1",
            "reactive_consumption_l1",
        ),
        "l2" => (
            "voltage_l2_n",
            "current_l2",
            "active_consumption_l2",
            "reactive_consumption_l2",
        ),
        _ => (
            "voltage_l3_n",
            "current_l3",
            "active_consumption_l3",
            "reactive_consumption_l3",
        ),
    }
}

// Test: Electricity eltako_dsz15dm 24450291 NOKEY
// telegram=|689292680801729102452494150102270000008C1004997500008C1104997500008C2004000000008C21040000000002FDC9FF01E80002FDDBFF01000002ACFF0101008240ACFF01010002FDC9FF02E80002FDDBFF02000002ACFF0200008240ACFF02000002FDC9FF03E70002FDDBFF03070002ACFF030E008240ACFF03080002FF68010002ACFF000F008240ACFF000A0001FF1300D416|
// {"media":"electricity","meter":"eltako_dsz15dm","name":"","id":"24450291","status":"OK","total_energy_consumption_tariff_1_kwh":75.99,"total_energy_consumption_tariff_2_kwh":0,"reactive_energy_consumption_tariff_1_kwh":75.99,"reactive_energy_consumption_tariff_2_kwh":0,"voltage_l1_n_v":232,"current_l1_a":0,"active_consumption_l1_kw":0.01,"reactive_consumption_l1_kw":0.01,"voltage_l2_n_v":232,"current_l2_a":0,"active_consumption_l2_kw":0,"reactive_consumption_l2_kw":0,"voltage_l3_n_v":231,"current_l3_a":0.7,"active_consumption_l3_kw":0.14,"reactive_consumption_l3_kw":0.08,"ct_numerator_nr":1,"active_consumption_total_kw":0.15,"reactive_consumption_total_kw":0.1,"active_tariff_nr":0,"timestamp":"1111-11-11T11:11:11Z"}
