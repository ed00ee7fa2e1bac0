//! Command-line argument parsing.

use clap::{Parser, Subcommand};

use appbox_hypervisor::{ApplianceState, Stream};

/// appbox - Spin up and configure appliance VMs on local libvirt
#[derive(Parser, Debug)]
#[command(name = "appbox")]
#[command(about = "Spin up and configure appliance VMs on local libvirt")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Hypervisor connection URI (e.g. qemu:///system)
    #[arg(long)]
    pub url: Option<String>,

    /// Use the in-memory mock hypervisor (development)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an appliance from a local image.
    Create {
        /// Appliance name
        name: String,
        /// Image file name, as listed by `appbox images`
        #[arg(short, long)]
        image: String,
        /// Virtual CPU count
        #[arg(long, default_value_t = 1)]
        cpu: u32,
        /// Memory in GiB
        #[arg(long, default_value_t = 4)]
        memory: u64,
        /// Database disk size in GiB
        #[arg(long, default_value_t = 5)]
        db_size: u64,
        /// Start the appliance and configure its database over the console
        #[arg(long)]
        configure: bool,
    },
    /// Start a defined appliance.
    Start {
        /// Appliance name or numeric id
        appliance: String,
    },
    /// Gracefully shut down a running appliance.
    Stop {
        /// Appliance name or numeric id
        appliance: String,
    },
    /// Shut down an appliance and delete its disks and definition.
    Kill {
        /// Appliance name or numeric id
        appliance: String,
    },
    /// List appliances.
    List {
        /// Only show appliances in this state (e.g. running, shut-off)
        #[arg(long)]
        status: Option<ApplianceState>,
    },
    /// List images, local by default.
    Images {
        /// List local images only
        #[arg(long, conflicts_with = "remote")]
        local: bool,
        /// List images available in the remote repository
        #[arg(long)]
        remote: bool,
        /// Release stream (community or enterprise; defaults to community
        /// for remote listings, no filter for local ones)
        #[arg(long)]
        stream: Option<Stream>,
        /// Release version filter (e.g. 5.11)
        #[arg(long)]
        version: Option<String>,
        /// Substring filter on image names
        #[arg(long)]
        filter: Option<String>,
    },
    /// Download an image from its release repository.
    Pull {
        /// Image file name, as listed by `appbox images --remote`
        image: String,
    },
    /// Remove local images.
    Rmi {
        /// Image file names
        #[arg(required = true)]
        images: Vec<String>,
    },
    /// Show the resolved configuration.
    Config {
        /// Write a default config file to the standard location
        #[arg(long)]
        init: bool,
    },
    /// Drive a running appliance's console menu.
    Configure {
        /// Appliance name or numeric id
        appliance: String,
        /// Configure the internal database
        #[arg(long)]
        database: bool,
        /// Restart the appliance server process
        #[arg(long)]
        restart_server: bool,
    },
}
