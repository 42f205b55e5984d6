//! # Value Information Field Tables
//!
//! The first VIF byte of a record identifies the quantity and scale. The
//! primary table covers `0x00..0x7B`; VIF `0xFD` and `0xFB` switch to the
//! first and second extension tables, folded here into one integer space
//! (`0x100 | code` and `0x200 | code`) so a VIF travels as a single `u16`.
//!
//! Ranges carry the quantity, the unit the decoded value is expressed in
//! and the rule for the scale exponent, e.g. `0x10..0x17` is Volume with
//! `value × 10^(n-6) m³`.

use crate::units::{Quantity, Unit};

/// A VIF with its extension page folded in.
pub type Vif = u16;

/// VIF FD 0A: the manufacturer code as data.
pub const VIF_MANUFACTURER_CODE: Vif = 0x10A;

/// Semantic VIF categories used by field matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VifRange {
    None,
    Any,
    EnergyWh,
    EnergyMJ,
    Volume,
    OnTime,
    OperatingTime,
    PowerW,
    VolumeFlow,
    FlowTemperature,
    ReturnTemperature,
    TemperatureDifference,
    ExternalTemperature,
    Pressure,
    Date,
    DateTime,
    HeatCostAllocation,
    AveragingDuration,
    ActualityDuration,
    FabricationNo,
    EnhancedIdentification,
    ErrorFlags,
    Voltage,
    Amperage,
    ModelVersion,
    ParameterSet,
    FirmwareVersion,
    Manufacturer,
    /// Matches any VIF whose quantity is Volume.
    AnyVolumeVIF,
    /// Matches any VIF whose quantity is Energy.
    AnyEnergyVIF,
    /// Matches any VIF whose quantity is Power.
    AnyPowerVIF,
}

struct RangeInfo {
    range: VifRange,
    from: Vif,
    to: Vif,
    quantity: Quantity,
    default_unit: Unit,
}

const VIF_RANGES: &[RangeInfo] = &[
    RangeInfo { range: VifRange::EnergyWh, from: 0x00, to: 0x07, quantity: Quantity::Energy, default_unit: Unit::Kwh },
    RangeInfo { range: VifRange::EnergyMJ, from: 0x0E, to: 0x0F, quantity: Quantity::Energy, default_unit: Unit::Mj },
    RangeInfo { range: VifRange::Volume, from: 0x10, to: 0x17, quantity: Quantity::Volume, default_unit: Unit::M3 },
    RangeInfo { range: VifRange::OnTime, from: 0x20, to: 0x23, quantity: Quantity::Time, default_unit: Unit::Hour },
    RangeInfo { range: VifRange::OperatingTime, from: 0x24, to: 0x27, quantity: Quantity::Time, default_unit: Unit::Hour },
    RangeInfo { range: VifRange::PowerW, from: 0x28, to: 0x2F, quantity: Quantity::Power, default_unit: Unit::Kw },
    RangeInfo { range: VifRange::VolumeFlow, from: 0x38, to: 0x3F, quantity: Quantity::Flow, default_unit: Unit::M3h },
    RangeInfo { range: VifRange::FlowTemperature, from: 0x58, to: 0x5B, quantity: Quantity::Temperature, default_unit: Unit::C },
    RangeInfo { range: VifRange::ReturnTemperature, from: 0x5C, to: 0x5F, quantity: Quantity::Temperature, default_unit: Unit::C },
    RangeInfo { range: VifRange::TemperatureDifference, from: 0x60, to: 0x63, quantity: Quantity::Temperature, default_unit: Unit::C },
    RangeInfo { range: VifRange::ExternalTemperature, from: 0x64, to: 0x67, quantity: Quantity::Temperature, default_unit: Unit::C },
    RangeInfo { range: VifRange::Pressure, from: 0x68, to: 0x6B, quantity: Quantity::Pressure, default_unit: Unit::Bar },
    RangeInfo { range: VifRange::Date, from: 0x6C, to: 0x6C, quantity: Quantity::PointInTime, default_unit: Unit::DateLT },
    RangeInfo { range: VifRange::DateTime, from: 0x6D, to: 0x6D, quantity: Quantity::PointInTime, default_unit: Unit::DateTimeLT },
    RangeInfo { range: VifRange::HeatCostAllocation, from: 0x6E, to: 0x6E, quantity: Quantity::Hca, default_unit: Unit::Hca },
    RangeInfo { range: VifRange::AveragingDuration, from: 0x70, to: 0x73, quantity: Quantity::Time, default_unit: Unit::Hour },
    RangeInfo { range: VifRange::ActualityDuration, from: 0x74, to: 0x77, quantity: Quantity::Time, default_unit: Unit::Hour },
    RangeInfo { range: VifRange::FabricationNo, from: 0x78, to: 0x78, quantity: Quantity::Text, default_unit: Unit::Txt },
    RangeInfo { range: VifRange::EnhancedIdentification, from: 0x79, to: 0x79, quantity: Quantity::Text, default_unit: Unit::Txt },
    RangeInfo { range: VifRange::Manufacturer, from: 0x10A, to: 0x10A, quantity: Quantity::Text, default_unit: Unit::Txt },
    RangeInfo { range: VifRange::ParameterSet, from: 0x10B, to: 0x10B, quantity: Quantity::Text, default_unit: Unit::Txt },
    RangeInfo { range: VifRange::ModelVersion, from: 0x10C, to: 0x10C, quantity: Quantity::Text, default_unit: Unit::Txt },
    RangeInfo { range: VifRange::FirmwareVersion, from: 0x10E, to: 0x10E, quantity: Quantity::Text, default_unit: Unit::Txt },
    RangeInfo { range: VifRange::ErrorFlags, from: 0x117, to: 0x117, quantity: Quantity::Dimensionless, default_unit: Unit::Counter },
    RangeInfo { range: VifRange::Voltage, from: 0x140, to: 0x14F, quantity: Quantity::Voltage, default_unit: Unit::Volt },
    RangeInfo { range: VifRange::Amperage, from: 0x150, to: 0x15F, quantity: Quantity::Amperage, default_unit: Unit::Ampere },
];

fn concrete_range(vif: Vif) -> Option<&'static RangeInfo> {
    VIF_RANGES.iter().find(|r| vif >= r.from && vif <= r.to)
}

/// Is `vif` inside the given semantic range?
pub fn is_inside_vif_range(vif: Vif, range: VifRange) -> bool {
    match range {
        VifRange::None => false,
        VifRange::Any => true,
        VifRange::AnyVolumeVIF => {
            concrete_range(vif).map(|r| r.quantity == Quantity::Volume) == Some(true)
        }
        VifRange::AnyEnergyVIF => {
            concrete_range(vif).map(|r| r.quantity == Quantity::Energy) == Some(true)
        }
        VifRange::AnyPowerVIF => {
            concrete_range(vif).map(|r| r.quantity == Quantity::Power) == Some(true)
        }
        _ => concrete_range(vif).map(|r| r.range == range) == Some(true),
    }
}

/// Quantity of a VIF, if it is in a known range.
pub fn vif_quantity(vif: Vif) -> Quantity {
    concrete_range(vif).map_or(Quantity::Unknown, |r| r.quantity)
}

/// Default unit of a semantic range.
pub fn range_default_unit(range: VifRange) -> Unit {
    match range {
        VifRange::AnyVolumeVIF => Unit::M3,
        VifRange::AnyEnergyVIF => Unit::Kwh,
        VifRange::AnyPowerVIF => Unit::Kw,
        VifRange::Any | VifRange::None => Unit::Unknown,
        _ => VIF_RANGES
            .iter()
            .find(|r| r.range == range)
            .map_or(Unit::Unknown, |r| r.default_unit),
    }
}

/// For a numeric VIF: the unit the decoded value is expressed in and the
/// power-of-ten exponent to apply to the raw integer.
///
/// Energy Wh (`E000 0nnn`) encodes `10^(nnn-3)` Wh, i.e. `10^(nnn-6)` kWh;
/// the time ranges encode the unit (s/min/h/d) in the low two bits instead
/// of a scale.
pub fn vif_unit_and_exponent(vif: Vif) -> Option<(Unit, i32)> {
    let r = concrete_range(vif)?;
    let n = (vif - r.from) as i32;
    let out = match r.range {
        VifRange::EnergyWh => (Unit::Kwh, n - 6),
        VifRange::EnergyMJ => (Unit::Mj, n),
        VifRange::Volume => (Unit::M3, n - 6),
        VifRange::PowerW => (Unit::Kw, n - 6),
        VifRange::VolumeFlow => (Unit::M3h, n - 6),
        VifRange::FlowTemperature
        | VifRange::ReturnTemperature
        | VifRange::TemperatureDifference
        | VifRange::ExternalTemperature => (Unit::C, n - 3),
        VifRange::Pressure => (Unit::Bar, n - 3),
        VifRange::HeatCostAllocation => (Unit::Hca, 0),
        VifRange::OnTime
        | VifRange::OperatingTime
        | VifRange::AveragingDuration
        | VifRange::ActualityDuration => (time_unit(vif), 0),
        VifRange::Voltage => (Unit::Volt, ((vif & 0xF) as i32) - 9),
        VifRange::Amperage => (Unit::Ampere, ((vif & 0xF) as i32) - 12),
        VifRange::ErrorFlags => (Unit::Counter, 0),
        _ => return None,
    };
    Some(out)
}

fn time_unit(vif: Vif) -> Unit {
    match vif & 0x3 {
        0 => Unit::Second,
        1 => Unit::Minute,
        2 => Unit::Hour,
        _ => Unit::Day,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_scaling() {
        // 0x04: 10 Wh resolution, two decimals in kWh.
        assert_eq!(vif_unit_and_exponent(0x04), Some((Unit::Kwh, -2)));
        // 0x06: whole kWh.
        assert_eq!(vif_unit_and_exponent(0x06), Some((Unit::Kwh, 0)));
    }

    #[test]
    fn test_volume_scaling() {
        // 0x13: litres.
        assert_eq!(vif_unit_and_exponent(0x13), Some((Unit::M3, -3)));
        assert_eq!(vif_unit_and_exponent(0x14), Some((Unit::M3, -2)));
    }

    #[test]
    fn test_temperature_scaling() {
        assert_eq!(vif_unit_and_exponent(0x5A), Some((Unit::C, -1)));
        assert_eq!(vif_unit_and_exponent(0x5B), Some((Unit::C, 0)));
        assert_eq!(vif_unit_and_exponent(0x62), Some((Unit::C, -1)));
    }

    #[test]
    fn test_fd_page_scaling() {
        // FD 49: volts, FD 5B: tenths of an ampere.
        assert_eq!(vif_unit_and_exponent(0x149), Some((Unit::Volt, 0)));
        assert_eq!(vif_unit_and_exponent(0x15B), Some((Unit::Ampere, -1)));
    }

    #[test]
    fn test_time_units() {
        assert_eq!(vif_unit_and_exponent(0x22), Some((Unit::Hour, 0)));
        assert_eq!(vif_unit_and_exponent(0x20), Some((Unit::Second, 0)));
        assert_eq!(vif_unit_and_exponent(0x26), Some((Unit::Hour, 0)));
    }

    #[test]
    fn test_ranges() {
        assert!(is_inside_vif_range(0x13, VifRange::Volume));
        assert!(is_inside_vif_range(0x13, VifRange::AnyVolumeVIF));
        assert!(is_inside_vif_range(0x06, VifRange::AnyEnergyVIF));
        assert!(is_inside_vif_range(0x0E, VifRange::AnyEnergyVIF));
        assert!(is_inside_vif_range(0x2C, VifRange::AnyPowerVIF));
        assert!(is_inside_vif_range(0x117, VifRange::ErrorFlags));
        assert!(!is_inside_vif_range(0x13, VifRange::AnyEnergyVIF));
        assert!(is_inside_vif_range(0x13, VifRange::Any));
        assert!(!is_inside_vif_range(0x13, VifRange::None));
    }

    #[test]
    fn test_quantities() {
        assert_eq!(vif_quantity(0x13), Quantity::Volume);
        assert_eq!(vif_quantity(0x149), Quantity::Voltage);
        assert_eq!(vif_quantity(0x7F), Quantity::Unknown);
    }
}
