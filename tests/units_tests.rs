//! Conversion properties of the unit algebra.

use mbus_decode::{convert, Quantity, Unit};
use proptest::prelude::*;

const LINEAR_PAIRS: &[(Unit, Unit)] = &[
    (Unit::M3, Unit::L),
    (Unit::Kwh, Unit::Wh),
    (Unit::Kwh, Unit::Mj),
    (Unit::Kwh, Unit::Gj),
    (Unit::Kw, Unit::W),
    (Unit::M3h, Unit::Lh),
    (Unit::Hour, Unit::Second),
    (Unit::Hour, Unit::Day),
    (Unit::Bar, Unit::Pa),
];

#[test]
fn test_quantity_defaults_are_self_convertible() {
    for q in [
        Quantity::Energy,
        Quantity::Power,
        Quantity::Volume,
        Quantity::Flow,
        Quantity::Temperature,
        Quantity::Voltage,
        Quantity::Amperage,
        Quantity::Time,
        Quantity::Hca,
    ] {
        let u = q.default_unit();
        assert_eq!(convert(1.5, u, u), Some(1.5), "{q:?}");
    }
}

#[test]
fn test_cross_quantity_conversion_fails() {
    assert_eq!(convert(1.0, Unit::Kwh, Unit::M3), None);
    assert_eq!(convert(1.0, Unit::C, Unit::M3), None);
    assert_eq!(convert(1.0, Unit::Hour, Unit::Kw), None);
}

proptest! {
    #[test]
    fn prop_linear_roundtrip(value in -1.0e9f64..1.0e9, idx in 0usize..LINEAR_PAIRS.len()) {
        let (a, b) = LINEAR_PAIRS[idx];
        let there = convert(value, a, b).unwrap();
        let back = convert(there, b, a).unwrap();
        let tolerance = value.abs().max(1.0) * 1e-9;
        prop_assert!((back - value).abs() <= tolerance, "{a:?} -> {b:?}: {value} != {back}");
    }

    #[test]
    fn prop_temperature_roundtrip(value in -200.0f64..1000.0) {
        for (a, b) in [(Unit::C, Unit::K), (Unit::C, Unit::F), (Unit::K, Unit::F)] {
            let there = convert(value, a, b).unwrap();
            let back = convert(there, b, a).unwrap();
            prop_assert!((back - value).abs() <= 1e-9 * value.abs().max(1.0));
        }
    }
}
