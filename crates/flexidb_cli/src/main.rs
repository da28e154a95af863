//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `flexidb_core` linkage without any configuration.
//! - Report which persistence drivers are registered and usable.

use flexidb_core::{DriverProbe, DriverRegistry};
use log::debug;

fn main() {
    println!("flexidb_core ping={}", flexidb_core::ping());
    println!("flexidb_core version={}", flexidb_core::core_version());

    let registry = DriverRegistry::with_builtin();
    for driver_id in registry.driver_ids() {
        let Some(driver) = registry.resolve(&driver_id) else {
            continue;
        };
        debug!("event=driver_probe module=cli driver={}", driver_id);
        match driver.probe() {
            DriverProbe::Available { version } => {
                println!("driver={driver_id} status=available version={version}");
            }
            DriverProbe::Missing { reason } => {
                println!("driver={driver_id} status=missing reason={reason}");
            }
        }
    }
}
