//! # Driver Registry
//!
//! Every driver registers a `DriverInfo` describing which meters it
//! understands: a set of (manufacturer, device type, version) detection
//! tuples, the link modes the meter transmits on, and a constructor that
//! installs the driver's field declarations into a fresh `Meter`.
//!
//! The registry is populated once, behind a `Lazy`, before any decode call
//! and is read-only afterwards, so it can be shared freely across decode
//! sessions. Detection walks the drivers in registration order and returns
//! the first match; an unmatched address falls back to the `unknown`
//! driver, which still renders headers and status but no data fields.

use once_cell::sync::Lazy;

use crate::meters::drivers;
use crate::meters::Meter;
use crate::telegram::Address;

/// Radio or wire modes a meter is expected to transmit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    S1,
    T1,
    C1,
    N1,
    MBus,
}

/// One detection tuple. `version: None` matches any version, for meter
/// families that keep the same layout across firmware revisions.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub mfct: u16,
    pub device_type: u8,
    pub version: Option<u8>,
}

impl Detection {
    pub const fn new(mfct: u16, device_type: u8, version: u8) -> Detection {
        Detection {
            mfct,
            device_type,
            version: Some(version),
        }
    }

    pub const fn any_version(mfct: u16, device_type: u8) -> Detection {
        Detection {
            mfct,
            device_type,
            version: None,
        }
    }

    fn matches(&self, address: &Address) -> bool {
        self.mfct == address.manufacturer
            && self.device_type == address.device_type
            && self.version.map_or(true, |v| v == address.version)
    }
}

/// Static description of one driver plug-in.
pub struct DriverInfo {
    pub name: &'static str,
    /// Comma-separated field selection used by tabular outputs.
    pub default_fields: &'static str,
    pub link_modes: &'static [LinkMode],
    pub detections: &'static [Detection],
    pub constructor: fn(&mut Meter),
}

/// The process-wide set of drivers, append-only during registration and
/// frozen afterwards.
pub struct DriverRegistry {
    drivers: Vec<DriverInfo>,
}

impl DriverRegistry {
    pub fn new() -> DriverRegistry {
        DriverRegistry {
            drivers: Vec::new(),
        }
    }

    pub fn register(&mut self, di: DriverInfo) {
        self.drivers.push(di);
    }

    /// First driver whose detection tuples match the address, in
    /// registration order.
    pub fn pick_driver(&self, address: &Address) -> Option<&DriverInfo> {
        self.drivers
            .iter()
            .find(|di| di.detections.iter().any(|d| d.matches(address)))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&DriverInfo> {
        self.drivers.iter().find(|di| di.name == name)
    }

    pub fn drivers(&self) -> &[DriverInfo] {
        &self.drivers
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        DriverRegistry::new()
    }
}

static REGISTRY: Lazy<DriverRegistry> = Lazy::new(drivers::register_all);

/// The process-wide driver registry.
pub fn registry() -> &'static DriverRegistry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    fn address(mfct: u16, device_type: u8, version: u8) -> Address {
        Address {
            manufacturer: mfct,
            id: "12345678".to_string(),
            version,
            device_type,
        }
    }

    #[test]
    fn test_pick_driver_by_tuple() {
        let r = registry();
        let di = r.pick_driver(&address(MANUFACTURER_KAM, 0x16, 0x1B)).unwrap();
        assert_eq!(di.name, "multical21");
        let di = r.pick_driver(&address(MANUFACTURER_ZRI, 0x07, 0x00)).unwrap();
        assert_eq!(di.name, "minomess");
        let di = r.pick_driver(&address(MANUFACTURER_HYD, 0x04, 0x20)).unwrap();
        assert_eq!(di.name, "sharky");
        let di = r.pick_driver(&address(MANUFACTURER_ELT, 0x02, 0x01)).unwrap();
        assert_eq!(di.name, "eltako_dsz15dm");
    }

    #[test]
    fn test_unmatched_address() {
        let r = registry();
        assert!(r.pick_driver(&address(0x0102, 0x33, 0x01)).is_none());
    }

    #[test]
    fn test_find_by_name() {
        let r = registry();
        assert!(r.find_by_name("apatoreitn").is_some());
        assert!(r.find_by_name("unknown").is_some());
        assert!(r.find_by_name("nonexistent").is_none());
    }

    #[test]
    fn test_detection_uniqueness_is_order_independent() {
        // Every detection tuple must resolve to exactly one driver, so
        // registration order cannot change the outcome.
        let r = registry();
        for di in r.drivers() {
            for d in di.detections {
                let hits: Vec<&str> = r
                    .drivers()
                    .iter()
                    .filter(|other| {
                        other.detections.iter().any(|o| {
                            o.mfct == d.mfct
                                && o.device_type == d.device_type
                                && (o.version.is_none()
                                    || d.version.is_none()
                                    || o.version == d.version)
                        })
                    })
                    .map(|other| other.name)
                    .collect();
                assert_eq!(hits, vec![di.name], "detection tuple claimed twice");
            }
        }
    }
}
