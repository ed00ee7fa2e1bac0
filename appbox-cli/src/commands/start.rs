use anyhow::{Context, Result};

use crate::commands::Manager;

pub fn run(manager: &Manager, appliance: &str) -> Result<()> {
    let started = manager
        .start(appliance)
        .with_context(|| format!("Failed to start appliance {appliance}"))?;
    if started {
        println!("Appliance {appliance} started");
    } else {
        println!("Appliance {appliance} already running");
    }
    Ok(())
}
