use anyhow::Result;

use appbox_hypervisor::ApplianceState;

use crate::commands::Manager;

pub fn run(manager: &Manager, status: Option<ApplianceState>) -> Result<()> {
    let appliances = manager.appliances(status)?;
    if appliances.is_empty() {
        println!("no appliances found");
        return Ok(());
    }

    println!("{:<6} {:<20} {:<12} ADDRESS", "ID", "NAME", "STATE");
    for appliance in &appliances {
        let id = appliance
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let address = appliance.address.as_deref().unwrap_or("-");
        println!(
            "{:<6} {:<20} {:<12} {}",
            id,
            appliance.name,
            appliance.state.as_str(),
            address
        );
    }
    Ok(())
}
