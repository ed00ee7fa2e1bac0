//! # appbox Hypervisor
//!
//! Appliance lifecycle management on top of libvirt/QEMU.
//!
//! This crate stages base images into a directory-backed storage pool,
//! materializes database volumes, defines and runs appliance domains, and
//! tears the whole arrangement down again. All hypervisor access goes
//! through the [`Hypervisor`] trait so the same flows run against the real
//! libvirt connection or the in-memory mock.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use appbox_hypervisor::{ApplianceManager, ApplianceSpec, ManagerSettings, MockConnection};
//!
//! let settings = ManagerSettings::new("default", "/var/lib/libvirt/images", "/tmp/images");
//! let manager = ApplianceManager::new(MockConnection::new(), settings);
//!
//! let spec = ApplianceSpec::new("cfme-59", "manageiq-59.qc2").with_version("5.9.0.1");
//! manager.create(&spec)?;
//! manager.start("cfme-59")?;
//! ```

pub mod error;
pub mod libvirt;
pub mod manager;
pub mod mock;
pub mod pool;
pub mod traits;
pub mod types;
mod xml;

pub use error::{HypervisorError, Result};
pub use manager::{
    ApplianceManager, ManagerSettings, DEFAULT_ADDRESS_WAIT, DEFAULT_POLL_INTERVAL,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use mock::MockConnection;
pub use pool::ResourcePool;
pub use traits::Hypervisor;
pub use types::*;

// Re-export the libvirt backend when compiled in
#[cfg(feature = "libvirt")]
pub use libvirt::LibvirtConnection;
