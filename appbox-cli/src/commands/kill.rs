use anyhow::{Context, Result};

use crate::commands::Manager;

pub fn run(manager: &Manager, appliance: &str) -> Result<()> {
    let report = manager
        .kill(appliance)
        .with_context(|| format!("Failed to kill appliance {appliance}"))?;

    for volume in &report.pool_deleted {
        println!("Deleted pool volume {volume}");
    }
    for path in &report.removed_directly {
        println!("Removed disk file {path}");
    }
    if report.is_empty() {
        println!("Appliance {appliance} had no disks to clean up");
    }
    println!("Appliance {appliance} deleted");
    Ok(())
}
