//! Core hypervisor abstraction trait.

use crate::error::Result;
use crate::types::*;

/// Connection-level hypervisor primitives.
///
/// This is the seam between appliance orchestration and the hypervisor
/// itself: one implementation speaks to libvirt (feature `libvirt`), the
/// other simulates everything in memory for tests and development. All
/// calls block; domains are keyed by name, which libvirt guarantees unique
/// among defined domains.
pub trait Hypervisor {
    // =========================================================================
    // Domains
    // =========================================================================

    /// List every defined domain, active or not.
    fn list_domains(&self) -> Result<Vec<DomainSummary>>;

    /// Look up one domain by name. `Ok(None)` when no such domain exists.
    fn lookup_domain(&self, name: &str) -> Result<Option<DomainSummary>>;

    /// Look up one domain by numeric id. Ids exist only while a domain runs.
    fn lookup_domain_by_id(&self, id: u32) -> Result<Option<DomainSummary>>;

    /// Define a persistent domain from the descriptor. Does not start it.
    fn define_domain(&self, config: &DomainConfig) -> Result<()>;

    /// Start a defined domain.
    fn start_domain(&self, name: &str) -> Result<()>;

    /// Send a graceful shutdown signal. Returns immediately; the guest
    /// powers off on its own schedule.
    fn shutdown_domain(&self, name: &str) -> Result<()>;

    /// Whether the domain is currently active.
    fn is_domain_active(&self, name: &str) -> Result<bool>;

    /// The persisted XML description of the domain.
    fn domain_xml(&self, name: &str) -> Result<String>;

    /// Remove the domain definition. The domain must not be running.
    fn undefine_domain(&self, name: &str) -> Result<()>;

    /// Guest interfaces with their leased addresses, as reported by the
    /// virtual network's lease database.
    fn interface_addresses(&self, name: &str) -> Result<Vec<InterfaceInfo>>;

    // =========================================================================
    // Storage pools
    // =========================================================================

    /// Look up one storage pool by name. `Ok(None)` when undefined.
    fn lookup_pool(&self, name: &str) -> Result<Option<PoolInfo>>;

    /// Define a directory-backed pool from the descriptor.
    fn define_pool(&self, config: &PoolConfig) -> Result<()>;

    /// Start an inactive pool.
    fn activate_pool(&self, name: &str) -> Result<()>;

    /// Mark the pool to start with the hypervisor.
    fn set_pool_autostart(&self, name: &str) -> Result<()>;

    // =========================================================================
    // Volumes
    // =========================================================================

    /// Materialize a volume in the pool.
    fn create_volume(&self, pool: &str, request: &VolumeRequest) -> Result<()>;

    /// Volumes the pool tracks, by file name.
    fn list_volumes(&self, pool: &str) -> Result<Vec<VolumeInfo>>;

    /// Delete a tracked volume through the pool.
    fn delete_volume(&self, pool: &str, volume: &str) -> Result<()>;
}

/// Forwarding impl so a runtime-selected `Box<dyn Hypervisor>` can be used
/// wherever a concrete backend is expected.
impl<H: Hypervisor + ?Sized> Hypervisor for Box<H> {
    fn list_domains(&self) -> Result<Vec<DomainSummary>> {
        (**self).list_domains()
    }

    fn lookup_domain(&self, name: &str) -> Result<Option<DomainSummary>> {
        (**self).lookup_domain(name)
    }

    fn lookup_domain_by_id(&self, id: u32) -> Result<Option<DomainSummary>> {
        (**self).lookup_domain_by_id(id)
    }

    fn define_domain(&self, config: &DomainConfig) -> Result<()> {
        (**self).define_domain(config)
    }

    fn start_domain(&self, name: &str) -> Result<()> {
        (**self).start_domain(name)
    }

    fn shutdown_domain(&self, name: &str) -> Result<()> {
        (**self).shutdown_domain(name)
    }

    fn is_domain_active(&self, name: &str) -> Result<bool> {
        (**self).is_domain_active(name)
    }

    fn domain_xml(&self, name: &str) -> Result<String> {
        (**self).domain_xml(name)
    }

    fn undefine_domain(&self, name: &str) -> Result<()> {
        (**self).undefine_domain(name)
    }

    fn interface_addresses(&self, name: &str) -> Result<Vec<InterfaceInfo>> {
        (**self).interface_addresses(name)
    }

    fn lookup_pool(&self, name: &str) -> Result<Option<PoolInfo>> {
        (**self).lookup_pool(name)
    }

    fn define_pool(&self, config: &PoolConfig) -> Result<()> {
        (**self).define_pool(config)
    }

    fn activate_pool(&self, name: &str) -> Result<()> {
        (**self).activate_pool(name)
    }

    fn set_pool_autostart(&self, name: &str) -> Result<()> {
        (**self).set_pool_autostart(name)
    }

    fn create_volume(&self, pool: &str, request: &VolumeRequest) -> Result<()> {
        (**self).create_volume(pool, request)
    }

    fn list_volumes(&self, pool: &str) -> Result<Vec<VolumeInfo>> {
        (**self).list_volumes(pool)
    }

    fn delete_volume(&self, pool: &str, volume: &str) -> Result<()> {
        (**self).delete_volume(pool, volume)
    }
}
