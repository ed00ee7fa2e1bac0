use anyhow::{Context, Result};

use crate::commands::Manager;

pub fn run(manager: &Manager, appliance: &str) -> Result<()> {
    let stopped = manager
        .stop(appliance)
        .with_context(|| format!("Failed to stop appliance {appliance}"))?;
    if stopped {
        println!("Appliance {appliance} shutting down");
    } else {
        println!("Appliance {appliance} not running");
    }
    Ok(())
}
