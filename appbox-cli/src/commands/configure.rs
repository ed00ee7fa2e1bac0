use anyhow::{Context, Result};

use appbox_hypervisor::ApplianceState;

use crate::commands::Manager;
use crate::config::Config;

pub fn run(
    manager: &Manager,
    config: &Config,
    appliance: &str,
    database: bool,
    restart_server: bool,
) -> Result<()> {
    // No flags means both actions.
    let (database, restart_server) = if !database && !restart_server {
        (true, true)
    } else {
        (database, restart_server)
    };

    let appliance = manager
        .get(appliance, Some(ApplianceState::Running))?
        .with_context(|| format!("No running appliance {appliance}"))?;

    let address = match appliance.address.clone() {
        Some(address) => address,
        None => manager
            .wait_for_address(&appliance.name)?
            .with_context(|| format!("Appliance {} never reported an address", appliance.name))?,
    };

    let version = appliance
        .description
        .as_ref()
        .map(|d| d.version.clone())
        .unwrap_or_default();

    drive_console(config, &address, &version, database, restart_server)
}

/// Drive the console menu of the appliance at `address`.
#[cfg(feature = "ssh")]
pub fn drive_console(
    config: &Config,
    address: &str,
    version: &str,
    database: bool,
    restart_server: bool,
) -> Result<()> {
    use appbox_console::{ConsoleDriver, Credentials, Ssh2Transport, VersionPolicy};

    let credentials = Credentials::new(&config.appliance.username, &config.appliance.password);
    let transport = Ssh2Transport::new(address).with_credentials(credentials);
    let mut driver = ConsoleDriver::new(transport);
    let policy = VersionPolicy::new();

    if database {
        driver
            .configure_database(&policy, version)
            .context("Database configuration failed")?;
        println!("Database configured on {address}");
    }
    if restart_server {
        driver
            .restart_server(&policy, version)
            .context("Server restart failed")?;
        println!("Server restarting on {address}");
    }
    Ok(())
}

#[cfg(not(feature = "ssh"))]
pub fn drive_console(
    _config: &Config,
    address: &str,
    _version: &str,
    _database: bool,
    _restart_server: bool,
) -> Result<()> {
    anyhow::bail!(
        "Console automation for {address} needs the `ssh` feature; rebuild with --features ssh"
    )
}
