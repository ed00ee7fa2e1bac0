//! # appbox
//!
//! Spin up, configure, and tear down appliance VMs on a local libvirt
//! host: image download, disk provisioning, domain lifecycle, and
//! first-boot console automation.
//!
//! ## Usage
//! ```bash
//! appbox pull manageiq-ovirt-jansa-1.qc2
//! appbox create cfme --image manageiq-ovirt-jansa-1.qc2 --configure
//! appbox kill cfme
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

mod cli;
mod commands;
mod config;
mod images;

use appbox_hypervisor::{ApplianceManager, Hypervisor, ManagerSettings, MockConnection};

use cli::{Cli, Commands};
use commands::Manager;
use config::{Backend, Config};
use images::ImageStore;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    appbox_common::init_logging(&cli.log_level)?;

    let config = load_config(&cli)?;
    let store = ImageStore::new(config.images_dir(), config.repositories.clone());

    match cli.command {
        Commands::Create {
            ref name,
            ref image,
            cpu,
            memory,
            db_size,
            configure,
        } => {
            let manager = build_manager(&config)?;
            commands::create::run(
                &manager, &store, &config, name, image, cpu, memory, db_size, configure,
            )
        }
        Commands::Start { ref appliance } => {
            commands::start::run(&build_manager(&config)?, appliance)
        }
        Commands::Stop { ref appliance } => {
            commands::stop::run(&build_manager(&config)?, appliance)
        }
        Commands::Kill { ref appliance } => {
            commands::kill::run(&build_manager(&config)?, appliance)
        }
        Commands::List { status } => commands::list::run(&build_manager(&config)?, status),
        Commands::Images {
            local: _,
            remote,
            stream,
            ref version,
            ref filter,
        } => commands::images::run(
            &store,
            remote,
            stream,
            version.as_deref(),
            filter.as_deref(),
        ),
        Commands::Pull { ref image } => commands::pull::run(&store, image),
        Commands::Rmi { ref images } => commands::rmi::run(&store, images),
        Commands::Config { init } => commands::config::run(&config, init),
        Commands::Configure {
            ref appliance,
            database,
            restart_server,
        } => commands::configure::run(
            &build_manager(&config)?,
            &config,
            appliance,
            database,
            restart_server,
        ),
    }
}

/// Load the config file, falling back to defaults when none exists.
fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!(config_path = %path, "Configuration loaded");
            Ok(config.with_cli_overrides(cli))
        }
        None => {
            let default_path = Config::default_path();
            match Config::load(&default_path) {
                Ok(config) => {
                    info!(config_path = %default_path.display(), "Configuration loaded");
                    Ok(config.with_cli_overrides(cli))
                }
                Err(_) => {
                    info!("No config file found, using defaults");
                    Ok(Config::default().with_cli_overrides(cli))
                }
            }
        }
    }
}

/// Build the appliance manager on the configured hypervisor backend.
fn build_manager(config: &Config) -> Result<Manager> {
    let hypervisor: Box<dyn Hypervisor> = match config.libvirt.backend {
        Backend::Mock => {
            info!("Using mock hypervisor backend");
            Box::new(MockConnection::new())
        }
        Backend::Libvirt => {
            #[cfg(feature = "libvirt")]
            {
                let uri = &config.libvirt.driver;
                info!(uri = %uri, "Connecting to libvirt");
                Box::new(appbox_hypervisor::LibvirtConnection::new(uri)?)
            }
            #[cfg(not(feature = "libvirt"))]
            {
                warn!("Libvirt backend requested but not compiled in, falling back to mock");
                Box::new(MockConnection::new())
            }
        }
    };

    let settings = ManagerSettings::new(
        config.libvirt.storage_pool.name.clone(),
        config.pool_path(),
        config.images_dir(),
    );
    Ok(ApplianceManager::new(hypervisor, settings))
}
