//! Driver plug-ins. Each driver declares its detection tuples and field
//! extractors; `register_all` builds the process-wide registry in a fixed
//! order, with the `unknown` fallback last.

pub mod apatoreitn;
pub mod eltako_dsz15dm;
pub mod minomess;
pub mod multical21;
pub mod sharky;
pub mod unknown;

use crate::meters::registry::DriverRegistry;

/// Build the registry with every driver registered.
pub fn register_all() -> DriverRegistry {
    let mut r = DriverRegistry::new();
    r.register(apatoreitn::driver_info());
    r.register(eltako_dsz15dm::driver_info());
    r.register(minomess::driver_info());
    r.register(multical21::driver_info());
    r.register(sharky::driver_info());
    r.register(unknown::driver_info());
    r
}
