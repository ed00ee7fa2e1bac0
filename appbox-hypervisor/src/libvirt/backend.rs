//! Libvirt backend implementation.

use tracing::{debug, info, instrument};
use virt::connect::Connect;
use virt::domain::Domain;
use virt::storage_pool::StoragePool;
use virt::storage_vol::StorageVol;
use virt::sys;

use crate::error::{HypervisorError, Result};
use crate::traits::Hypervisor;
use crate::types::*;
use crate::xml::{self, DomainXmlBuilder};

/// Libvirt/QEMU hypervisor connection.
pub struct LibvirtConnection {
    uri: String,
    connection: Connect,
}

impl LibvirtConnection {
    /// Connect to libvirt at the given URI.
    ///
    /// Common URIs:
    /// - `qemu:///system` - System-wide QEMU/KVM
    /// - `qemu:///session` - User session QEMU
    /// - `qemu+ssh://user@host/system` - Remote via SSH
    pub fn new(uri: &str) -> Result<Self> {
        info!(uri = %uri, "Connecting to libvirt");

        let connection = Connect::open(Some(uri))
            .map_err(|e| HypervisorError::ConnectionFailed(e.to_string()))?;

        info!("Connected to libvirt");

        Ok(Self {
            uri: uri.to_string(),
            connection,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn get_domain(&self, name: &str) -> Result<Domain> {
        Domain::lookup_by_name(&self.connection, name)
            .map_err(|e| HypervisorError::NotFound(format!("{}: {}", name, e)))
    }

    fn get_pool(&self, name: &str) -> Result<StoragePool> {
        StoragePool::lookup_by_name(&self.connection, name)
            .map_err(|e| HypervisorError::PoolFailed(format!("{}: {}", name, e)))
    }

    fn summarize(domain: &Domain) -> Result<DomainSummary> {
        let name = domain
            .get_name()
            .map_err(|e| HypervisorError::Internal(e.to_string()))?;
        let (state, _) = domain
            .get_state()
            .map_err(|e| HypervisorError::Internal(e.to_string()))?;

        Ok(DomainSummary {
            name,
            id: domain.get_id(),
            state: Self::state_from_libvirt(state),
        })
    }

    /// Convert a libvirt domain state to ApplianceState.
    fn state_from_libvirt(state: sys::virDomainState) -> ApplianceState {
        match state {
            sys::VIR_DOMAIN_RUNNING => ApplianceState::Running,
            sys::VIR_DOMAIN_BLOCKED => ApplianceState::Idle,
            sys::VIR_DOMAIN_PAUSED => ApplianceState::Paused,
            sys::VIR_DOMAIN_SHUTDOWN => ApplianceState::InShutdown,
            sys::VIR_DOMAIN_SHUTOFF => ApplianceState::ShutOff,
            sys::VIR_DOMAIN_CRASHED => ApplianceState::Crashed,
            _ => ApplianceState::NoState,
        }
    }

    fn pool_info(&self, name: &str, pool: &StoragePool) -> Result<PoolInfo> {
        let pool_xml = pool
            .get_xml_desc(0)
            .map_err(|e| HypervisorError::Internal(e.to_string()))?;
        let path = xml::pool_path(&pool_xml)?.ok_or_else(|| {
            HypervisorError::PoolFailed(format!("pool {} has no target path", name))
        })?;
        let active = pool
            .is_active()
            .map_err(|e| HypervisorError::Internal(e.to_string()))?;
        let autostart = pool.get_autostart().unwrap_or(false);

        Ok(PoolInfo {
            name: name.to_string(),
            path,
            active,
            autostart,
        })
    }
}

impl Hypervisor for LibvirtConnection {
    fn list_domains(&self) -> Result<Vec<DomainSummary>> {
        let flags =
            sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE | sys::VIR_CONNECT_LIST_DOMAINS_INACTIVE;

        let domains = self
            .connection
            .list_all_domains(flags)
            .map_err(|e| HypervisorError::Internal(e.to_string()))?;

        let mut result = Vec::with_capacity(domains.len());
        for domain in domains {
            result.push(Self::summarize(&domain)?);
        }

        debug!(count = result.len(), "Listed domains");
        Ok(result)
    }

    fn lookup_domain(&self, name: &str) -> Result<Option<DomainSummary>> {
        match Domain::lookup_by_name(&self.connection, name) {
            Ok(domain) => Ok(Some(Self::summarize(&domain)?)),
            Err(_) => Ok(None),
        }
    }

    fn lookup_domain_by_id(&self, id: u32) -> Result<Option<DomainSummary>> {
        match Domain::lookup_by_id(&self.connection, id) {
            Ok(domain) => Ok(Some(Self::summarize(&domain)?)),
            Err(_) => Ok(None),
        }
    }

    #[instrument(skip(self, config), fields(domain = %config.name))]
    fn define_domain(&self, config: &DomainConfig) -> Result<()> {
        let domain_xml = DomainXmlBuilder::new(config).build();
        debug!(xml = %domain_xml, "Generated domain XML");

        Domain::define_xml(&self.connection, &domain_xml)
            .map_err(|e| HypervisorError::DefineFailed(e.to_string()))?;

        info!("Domain defined");
        Ok(())
    }

    #[instrument(skip(self), fields(domain = %name))]
    fn start_domain(&self, name: &str) -> Result<()> {
        let domain = self.get_domain(name)?;

        domain
            .create()
            .map_err(|e| HypervisorError::StartFailed(e.to_string()))?;

        info!("Domain started");
        Ok(())
    }

    #[instrument(skip(self), fields(domain = %name))]
    fn shutdown_domain(&self, name: &str) -> Result<()> {
        let domain = self.get_domain(name)?;

        domain
            .shutdown()
            .map_err(|e| HypervisorError::Internal(e.to_string()))?;

        info!("Shutdown signalled");
        Ok(())
    }

    fn is_domain_active(&self, name: &str) -> Result<bool> {
        let domain = self.get_domain(name)?;
        domain
            .is_active()
            .map_err(|e| HypervisorError::Internal(e.to_string()))
    }

    fn domain_xml(&self, name: &str) -> Result<String> {
        let domain = self.get_domain(name)?;
        domain
            .get_xml_desc(0)
            .map_err(|e| HypervisorError::Internal(e.to_string()))
    }

    #[instrument(skip(self), fields(domain = %name))]
    fn undefine_domain(&self, name: &str) -> Result<()> {
        let domain = self.get_domain(name)?;

        domain
            .undefine()
            .map_err(|e| HypervisorError::Internal(e.to_string()))?;

        info!("Domain undefined");
        Ok(())
    }

    fn interface_addresses(&self, name: &str) -> Result<Vec<InterfaceInfo>> {
        let domain = self.get_domain(name)?;

        let interfaces = domain
            .interface_addresses(sys::VIR_DOMAIN_INTERFACE_ADDRESSES_SRC_LEASE, 0)
            .map_err(|e| HypervisorError::Internal(e.to_string()))?;

        Ok(interfaces
            .into_iter()
            .map(|iface| InterfaceInfo {
                hwaddr: iface.hwaddr,
                addrs: iface.addrs.into_iter().map(|a| a.addr).collect(),
            })
            .collect())
    }

    fn lookup_pool(&self, name: &str) -> Result<Option<PoolInfo>> {
        match StoragePool::lookup_by_name(&self.connection, name) {
            Ok(pool) => Ok(Some(self.pool_info(name, &pool)?)),
            Err(_) => Ok(None),
        }
    }

    #[instrument(skip(self, config), fields(pool = %config.name))]
    fn define_pool(&self, config: &PoolConfig) -> Result<()> {
        let pool_xml = xml::pool_xml(config);
        debug!(xml = %pool_xml, "Generated pool XML");

        StoragePool::define_xml(&self.connection, &pool_xml, 0)
            .map_err(|e| HypervisorError::PoolFailed(e.to_string()))?;

        info!("Pool defined");
        Ok(())
    }

    #[instrument(skip(self), fields(pool = %name))]
    fn activate_pool(&self, name: &str) -> Result<()> {
        let pool = self.get_pool(name)?;

        pool.create(0)
            .map_err(|e| HypervisorError::PoolFailed(e.to_string()))?;

        info!("Pool activated");
        Ok(())
    }

    fn set_pool_autostart(&self, name: &str) -> Result<()> {
        let pool = self.get_pool(name)?;

        pool.set_autostart(true)
            .map_err(|e| HypervisorError::PoolFailed(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(pool = %pool, volume = %request.file_name()))]
    fn create_volume(&self, pool: &str, request: &VolumeRequest) -> Result<()> {
        let handle = self.get_pool(pool)?;
        let info = self.pool_info(pool, &handle)?;

        let volume_xml = xml::volume_xml(&info.path, request);
        debug!(xml = %volume_xml, "Generated volume XML");

        StorageVol::create_xml(&handle, &volume_xml, 0)
            .map_err(|e| HypervisorError::VolumeCreateFailed(e.to_string()))?;

        info!("Volume created");
        Ok(())
    }

    fn list_volumes(&self, pool: &str) -> Result<Vec<VolumeInfo>> {
        let handle = self.get_pool(pool)?;

        let names = handle
            .list_volumes()
            .map_err(|e| HypervisorError::Internal(e.to_string()))?;

        let mut result = Vec::with_capacity(names.len());
        for name in names {
            let vol = StorageVol::lookup_by_name(&handle, &name)
                .map_err(|e| HypervisorError::Internal(e.to_string()))?;
            let path = vol
                .get_path()
                .map_err(|e| HypervisorError::Internal(e.to_string()))?;
            result.push(VolumeInfo {
                name,
                path: path.into(),
            });
        }

        debug!(pool = %pool, count = result.len(), "Listed volumes");
        Ok(result)
    }

    #[instrument(skip(self), fields(pool = %pool, volume = %volume))]
    fn delete_volume(&self, pool: &str, volume: &str) -> Result<()> {
        let handle = self.get_pool(pool)?;

        let vol = StorageVol::lookup_by_name(&handle, volume)
            .map_err(|e| HypervisorError::NotFound(format!("{}: {}", volume, e)))?;
        vol.delete(0)
            .map_err(|e| HypervisorError::Internal(e.to_string()))?;

        info!("Volume deleted");
        Ok(())
    }
}
