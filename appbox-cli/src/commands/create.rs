use anyhow::{Context, Result};

use appbox_hypervisor::ApplianceSpec;

use crate::commands::{configure, Manager};
use crate::config::Config;
use crate::images::{parse_image_name, ImageStore};

#[allow(clippy::too_many_arguments)]
pub fn run(
    manager: &Manager,
    store: &ImageStore,
    config: &Config,
    name: &str,
    image: &str,
    cpu: u32,
    memory: u64,
    db_size: u64,
    with_configure: bool,
) -> Result<()> {
    let (stream, version) = parse_image_name(image);
    let spec = ApplianceSpec::new(name, image)
        .with_cpu(cpu)
        .with_memory_gb(memory)
        .with_db_size_gb(db_size)
        .with_stream(stream)
        .with_version(version.unwrap_or(""));

    // Point the caller at `pull` before any disks get staged.
    if !store.image_path(image).exists() {
        anyhow::bail!("No local image {image}; download it with `appbox pull {image}`");
    }

    let appliance = manager
        .create(&spec)
        .with_context(|| format!("Failed to create appliance {name}"))?;
    println!("Created appliance {} ({})", appliance.name, appliance.state);

    if with_configure {
        manager
            .start(name)
            .with_context(|| format!("Failed to start appliance {name}"))?;
        println!("Started appliance {name}");

        let address = manager
            .wait_for_address(name)?
            .with_context(|| format!("Appliance {name} never reported an address"))?;
        println!("Appliance address: {address}");

        configure::drive_console(config, &address, version.unwrap_or(""), true, true)?;
    }

    Ok(())
}
