use anyhow::{Context, Result};

use crate::config::Config;

pub fn run(config: &Config, init: bool) -> Result<()> {
    if init {
        let path = Config::default_path();
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }
        Config::write_default(&path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let rendered =
        serde_yaml::to_string(config).context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
