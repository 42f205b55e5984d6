//! # Unit Algebra
//!
//! Named quantities and units for meter readings, plus the SI-exponent
//! machinery used for conversion and for unit-checked formula evaluation.
//!
//! A named quantity has a preferred unit: Volume has m³, Energy has kWh,
//! Power has kW. Drivers search telegrams for quantities rather than
//! hardcoding a unit, since some meters send e.g. either MJ or kWh depending
//! on configuration.
//!
//! Each named `Unit` maps to an unnamed `SiUnit` which encodes a scale and a
//! vector of exponents over the axes (s, m, kg, A, mol, cd, K, °C, °F,
//! month, year, unix-ts). Two values are convertible iff their exponent
//! vectors match; °C/°F/K are kept as distinct axes because they are offset
//! units: once a temperature is multiplied into a compound unit the offset
//! can no longer be applied, so only pure temperatures convert across the
//! three.

use serde::{Deserialize, Serialize};

/// A physical quantity a meter field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantity {
    Time,
    Energy,
    Power,
    Volume,
    Flow,
    Temperature,
    Voltage,
    Amperage,
    Frequency,
    Pressure,
    PointInTime,
    RelativeHumidity,
    Hca,
    Text,
    Dimensionless,
    Unknown,
}

impl Quantity {
    /// The unit a field of this quantity is rendered in unless the driver
    /// asks for a specific one.
    pub fn default_unit(&self) -> Unit {
        match self {
            Quantity::Time => Unit::Hour,
            Quantity::Energy => Unit::Kwh,
            Quantity::Power => Unit::Kw,
            Quantity::Volume => Unit::M3,
            Quantity::Flow => Unit::M3h,
            Quantity::Temperature => Unit::C,
            Quantity::Voltage => Unit::Volt,
            Quantity::Amperage => Unit::Ampere,
            Quantity::Frequency => Unit::Hz,
            Quantity::Pressure => Unit::Bar,
            Quantity::PointInTime => Unit::DateTimeLT,
            Quantity::RelativeHumidity => Unit::Rh,
            Quantity::Hca => Unit::Hca,
            Quantity::Text => Unit::Txt,
            Quantity::Dimensionless => Unit::Counter,
            Quantity::Unknown => Unit::Unknown,
        }
    }
}

/// A named unit that can appear in a rendered field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
    Wh,
    Kwh,
    Mj,
    Gj,
    W,
    Kw,
    M3,
    L,
    M3h,
    Lh,
    C,
    K,
    F,
    Volt,
    Ampere,
    Hz,
    Pa,
    Bar,
    Rh,
    Hca,
    Txt,
    DateTimeLT,
    DateLT,
    TimeLT,
    UnixTimestamp,
    Counter,
    Number,
    Factor,
    Percentage,
    Unknown,
}

/// Axis count of the SI exponent vector.
pub const SI_AXES: usize = 12;

const AX_S: usize = 0;
const AX_M: usize = 1;
const AX_KG: usize = 2;
const AX_A: usize = 3;
#[allow(dead_code)]
const AX_MOL: usize = 4;
#[allow(dead_code)]
const AX_CD: usize = 5;
const AX_K: usize = 6;
const AX_C: usize = 7;
const AX_F: usize = 8;
const AX_MONTH: usize = 9;
const AX_YEAR: usize = 10;
const AX_UT: usize = 11;

/// Exponent vector over the SI axes. Exponents saturate at i8 bounds; an
/// over/underflow marks the vector invalid and poisons further conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiExp {
    axes: [i8; SI_AXES],
    invalid: bool,
}

impl SiExp {
    pub const fn none() -> Self {
        SiExp {
            axes: [0; SI_AXES],
            invalid: false,
        }
    }

    const fn on(axis: usize, e: i8) -> Self {
        let mut axes = [0i8; SI_AXES];
        axes[axis] = e;
        SiExp {
            axes,
            invalid: false,
        }
    }

    const fn energy() -> Self {
        // kg·m²/s²
        let mut axes = [0i8; SI_AXES];
        axes[AX_KG] = 1;
        axes[AX_M] = 2;
        axes[AX_S] = -2;
        SiExp {
            axes,
            invalid: false,
        }
    }

    const fn power() -> Self {
        // kg·m²/s³
        let mut axes = [0i8; SI_AXES];
        axes[AX_KG] = 1;
        axes[AX_M] = 2;
        axes[AX_S] = -3;
        SiExp {
            axes,
            invalid: false,
        }
    }

    const fn flow() -> Self {
        // m³/s
        let mut axes = [0i8; SI_AXES];
        axes[AX_M] = 3;
        axes[AX_S] = -1;
        SiExp {
            axes,
            invalid: false,
        }
    }

    const fn voltage() -> Self {
        // kg·m²/(s³·A)
        let mut axes = [0i8; SI_AXES];
        axes[AX_KG] = 1;
        axes[AX_M] = 2;
        axes[AX_S] = -3;
        axes[AX_A] = -1;
        SiExp {
            axes,
            invalid: false,
        }
    }

    const fn pressure() -> Self {
        // kg/(m·s²)
        let mut axes = [0i8; SI_AXES];
        axes[AX_KG] = 1;
        axes[AX_M] = -1;
        axes[AX_S] = -2;
        SiExp {
            axes,
            invalid: false,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid || self.multiple_offset_axes()
    }

    fn multiple_offset_axes(&self) -> bool {
        let temps = [self.axes[AX_K], self.axes[AX_C], self.axes[AX_F]]
            .iter()
            .filter(|e| **e != 0)
            .count();
        let times = [self.axes[AX_MONTH], self.axes[AX_YEAR], self.axes[AX_UT]]
            .iter()
            .filter(|e| **e != 0)
            .count();
        temps > 1 || times > 1
    }

    pub fn mul(&self, other: &SiExp) -> SiExp {
        self.combine(other, i8::checked_add)
    }

    pub fn div(&self, other: &SiExp) -> SiExp {
        self.combine(other, i8::checked_sub)
    }

    fn combine(&self, other: &SiExp, op: fn(i8, i8) -> Option<i8>) -> SiExp {
        let mut out = SiExp::none();
        out.invalid = self.invalid || other.invalid;
        for i in 0..SI_AXES {
            match op(self.axes[i], other.axes[i]) {
                Some(e) => out.axes[i] = e,
                None => out.invalid = true,
            }
        }
        out
    }

    /// Halves every exponent. Fails on any odd exponent since that would
    /// yield a fractional power.
    pub fn sqrt(&self) -> Option<SiExp> {
        let mut out = SiExp::none();
        out.invalid = self.invalid;
        for i in 0..SI_AXES {
            if self.axes[i] % 2 != 0 {
                return None;
            }
            out.axes[i] = self.axes[i] / 2;
        }
        Some(out)
    }

    fn is_pure_temperature(&self) -> bool {
        let mut rest_zero = true;
        for (i, e) in self.axes.iter().enumerate() {
            match i {
                AX_K | AX_C | AX_F => {}
                _ => {
                    if *e != 0 {
                        rest_zero = false;
                    }
                }
            }
        }
        rest_zero
            && (self.axes[AX_K] == 1 && self.axes[AX_C] == 0 && self.axes[AX_F] == 0
                || self.axes[AX_C] == 1 && self.axes[AX_K] == 0 && self.axes[AX_F] == 0
                || self.axes[AX_F] == 1 && self.axes[AX_K] == 0 && self.axes[AX_C] == 0)
    }
}

/// An unnamed unit: a scale against the SI base of its exponent vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiUnit {
    pub scale: f64,
    pub exp: SiExp,
}

impl SiUnit {
    pub const fn new(scale: f64, exp: SiExp) -> Self {
        SiUnit { scale, exp }
    }

    pub fn mul(&self, other: &SiUnit) -> SiUnit {
        SiUnit {
            scale: self.scale * other.scale,
            exp: self.exp.mul(&other.exp),
        }
    }

    pub fn div(&self, other: &SiUnit) -> SiUnit {
        SiUnit {
            scale: self.scale / other.scale,
            exp: self.exp.div(&other.exp),
        }
    }

    pub fn sqrt(&self) -> Option<SiUnit> {
        Some(SiUnit {
            scale: self.scale.sqrt(),
            exp: self.exp.sqrt()?,
        })
    }
}

impl Unit {
    /// The lowercase suffix appended to field names, e.g. `total` + m³
    /// becomes `total_m3`.
    pub fn suffix(&self) -> &'static str {
        match self {
            Unit::Second => "s",
            Unit::Minute => "min",
            Unit::Hour => "h",
            Unit::Day => "d",
            Unit::Month => "month",
            Unit::Year => "y",
            Unit::Wh => "wh",
            Unit::Kwh => "kwh",
            Unit::Mj => "mj",
            Unit::Gj => "gj",
            Unit::W => "w",
            Unit::Kw => "kw",
            Unit::M3 => "m3",
            Unit::L => "l",
            Unit::M3h => "m3h",
            Unit::Lh => "lh",
            Unit::C => "c",
            Unit::K => "k",
            Unit::F => "f",
            Unit::Volt => "v",
            Unit::Ampere => "a",
            Unit::Hz => "hz",
            Unit::Pa => "pa",
            Unit::Bar => "bar",
            Unit::Rh => "rh",
            Unit::Hca => "hca",
            Unit::Txt => "txt",
            Unit::DateTimeLT => "datetime",
            Unit::DateLT => "date",
            Unit::TimeLT => "time",
            Unit::UnixTimestamp => "ut",
            Unit::Counter => "counter",
            Unit::Number => "nr",
            Unit::Factor => "factor",
            Unit::Percentage => "pct",
            Unit::Unknown => "",
        }
    }

    /// Resolve a unit from its field-name suffix (used by the formula
    /// parser for literals like `100 kwh`).
    pub fn from_suffix(s: &str) -> Option<Unit> {
        const ALL: &[Unit] = &[
            Unit::Second,
            Unit::Minute,
            Unit::Hour,
            Unit::Day,
            Unit::Month,
            Unit::Year,
            Unit::Wh,
            Unit::Kwh,
            Unit::Mj,
            Unit::Gj,
            Unit::W,
            Unit::Kw,
            Unit::M3,
            Unit::L,
            Unit::M3h,
            Unit::Lh,
            Unit::C,
            Unit::K,
            Unit::F,
            Unit::Volt,
            Unit::Ampere,
            Unit::Hz,
            Unit::Pa,
            Unit::Bar,
            Unit::Rh,
            Unit::Hca,
            Unit::Counter,
            Unit::Number,
            Unit::Factor,
            Unit::Percentage,
        ];
        ALL.iter().find(|u| u.suffix() == s).copied()
    }

    /// The SIUnit behind this named unit, if it is numeric and convertible.
    pub fn si_unit(&self) -> Option<SiUnit> {
        let si = match self {
            Unit::Second => SiUnit::new(1.0, SiExp::on(AX_S, 1)),
            Unit::Minute => SiUnit::new(60.0, SiExp::on(AX_S, 1)),
            Unit::Hour => SiUnit::new(3600.0, SiExp::on(AX_S, 1)),
            Unit::Day => SiUnit::new(86400.0, SiExp::on(AX_S, 1)),
            Unit::Month => SiUnit::new(1.0, SiExp::on(AX_MONTH, 1)),
            Unit::Year => SiUnit::new(1.0, SiExp::on(AX_YEAR, 1)),
            Unit::Wh => SiUnit::new(3600.0, SiExp::energy()),
            Unit::Kwh => SiUnit::new(3.6e6, SiExp::energy()),
            Unit::Mj => SiUnit::new(1e6, SiExp::energy()),
            Unit::Gj => SiUnit::new(1e9, SiExp::energy()),
            Unit::W => SiUnit::new(1.0, SiExp::power()),
            Unit::Kw => SiUnit::new(1e3, SiExp::power()),
            Unit::M3 => SiUnit::new(1.0, SiExp::on(AX_M, 3)),
            Unit::L => SiUnit::new(1e-3, SiExp::on(AX_M, 3)),
            Unit::M3h => SiUnit::new(1.0 / 3600.0, SiExp::flow()),
            Unit::Lh => SiUnit::new(1e-3 / 3600.0, SiExp::flow()),
            Unit::C => SiUnit::new(1.0, SiExp::on(AX_C, 1)),
            Unit::K => SiUnit::new(1.0, SiExp::on(AX_K, 1)),
            Unit::F => SiUnit::new(1.0, SiExp::on(AX_F, 1)),
            Unit::Volt => SiUnit::new(1.0, SiExp::voltage()),
            Unit::Ampere => SiUnit::new(1.0, SiExp::on(AX_A, 1)),
            Unit::Hz => SiUnit::new(1.0, SiExp::on(AX_S, -1)),
            Unit::Pa => SiUnit::new(1.0, SiExp::pressure()),
            Unit::Bar => SiUnit::new(1e5, SiExp::pressure()),
            Unit::Rh => SiUnit::new(1.0, SiExp::none()),
            Unit::Hca => SiUnit::new(1.0, SiExp::none()),
            Unit::UnixTimestamp => SiUnit::new(1.0, SiExp::on(AX_UT, 1)),
            Unit::Counter | Unit::Number | Unit::Factor => SiUnit::new(1.0, SiExp::none()),
            Unit::Percentage => SiUnit::new(0.01, SiExp::none()),
            Unit::Txt
            | Unit::DateTimeLT
            | Unit::DateLT
            | Unit::TimeLT
            | Unit::Unknown => return None,
        };
        Some(si)
    }
}

/// Convert a value between two named units.
///
/// Succeeds iff the exponent vectors match and neither side is invalid;
/// pure temperatures additionally convert across °C/°F/K with the offset
/// applied at conversion time.
pub fn convert(value: f64, from: Unit, to: Unit) -> Option<f64> {
    if from == to {
        return Some(value);
    }

    let f = from.si_unit()?;
    let t = to.si_unit()?;

    if f.exp.is_pure_temperature() && t.exp.is_pure_temperature() {
        let kelvin = match from {
            Unit::K => value,
            Unit::C => value + 273.15,
            Unit::F => (value - 32.0) / 1.8 + 273.15,
            _ => return None,
        };
        return match to {
            Unit::K => Some(kelvin),
            Unit::C => Some(kelvin - 273.15),
            Unit::F => Some((kelvin - 273.15) * 1.8 + 32.0),
            _ => None,
        };
    }

    if f.exp.is_invalid() || t.exp.is_invalid() || f.exp != t.exp {
        return None;
    }

    Some(value * f.scale / t.scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        assert_eq!(convert(6.408, Unit::M3, Unit::M3), Some(6.408));
    }

    #[test]
    fn test_linear_conversions() {
        assert_eq!(convert(1.0, Unit::M3, Unit::L), Some(1000.0));
        assert_eq!(convert(1.0, Unit::Kwh, Unit::Wh), Some(1000.0));
        assert!((convert(1.0, Unit::Kwh, Unit::Mj).unwrap() - 3.6).abs() < 1e-12);
        assert_eq!(convert(2.0, Unit::Hour, Unit::Second), Some(7200.0));
        assert_eq!(convert(500.0, Unit::Lh, Unit::M3h), Some(0.5));
    }

    #[test]
    fn test_temperature_offsets() {
        assert_eq!(convert(0.0, Unit::C, Unit::K), Some(273.15));
        assert_eq!(convert(212.0, Unit::F, Unit::C), Some(100.0));
        let back = convert(convert(21.5, Unit::C, Unit::F).unwrap(), Unit::F, Unit::C).unwrap();
        assert!((back - 21.5).abs() < 1e-9);
    }

    #[test]
    fn test_incompatible_vectors_fail() {
        assert_eq!(convert(1.0, Unit::M3, Unit::Kwh), None);
        assert_eq!(convert(1.0, Unit::Volt, Unit::Ampere), None);
        assert_eq!(convert(1.0, Unit::Txt, Unit::M3), None);
    }

    #[test]
    fn test_exponent_algebra() {
        let kw = Unit::Kw.si_unit().unwrap();
        let h = Unit::Hour.si_unit().unwrap();
        let kwh = Unit::Kwh.si_unit().unwrap();
        let product = kw.mul(&h);
        assert_eq!(product.exp, kwh.exp);
        // 100 kW * 22 h == 2200 kWh, computed through the SI scales.
        let v = 100.0 * 22.0 * product.scale / kwh.scale;
        assert!((v - 2200.0).abs() < 1e-9);
    }

    #[test]
    fn test_sqrt_halves_exponents() {
        let m3 = Unit::M3.si_unit().unwrap();
        let m6 = m3.mul(&m3);
        let back = m6.sqrt().unwrap();
        assert_eq!(back.exp, m3.exp);
        // Odd exponents cannot be halved.
        assert!(m3.sqrt().is_none());
    }

    #[test]
    fn test_default_units() {
        assert_eq!(Quantity::Energy.default_unit(), Unit::Kwh);
        assert_eq!(Quantity::Volume.default_unit(), Unit::M3);
        assert_eq!(Quantity::Temperature.default_unit(), Unit::C);
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(Unit::Kwh.suffix(), "kwh");
        assert_eq!(Unit::Number.suffix(), "nr");
        assert_eq!(Unit::DateLT.suffix(), "date");
        assert_eq!(Unit::from_suffix("m3h"), Some(Unit::M3h));
    }
}
