//! CLI subcommand implementations, one module per subcommand.

pub mod config;
pub mod configure;
pub mod create;
pub mod images;
pub mod kill;
pub mod list;
pub mod pull;
pub mod rmi;
pub mod start;
pub mod stop;

use appbox_hypervisor::{ApplianceManager, Hypervisor};

/// The manager as every subcommand sees it: generic over whichever
/// backend main selected.
pub type Manager = ApplianceManager<Box<dyn Hypervisor>>;
