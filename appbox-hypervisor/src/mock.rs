//! Mock hypervisor backend for testing and development.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use tracing::{debug, info, instrument};

use crate::error::{HypervisorError, Result};
use crate::traits::Hypervisor;
use crate::types::*;
use crate::xml::DomainXmlBuilder;

/// Mock hypervisor backend.
///
/// Simulates domain and storage pool operations in memory without a
/// running libvirtd. Volumes are materialized as real (empty) files under
/// the pool path so that staging and teardown walk an actual filesystem.
/// Useful for:
/// - Unit and integration testing
/// - Development without libvirt installed
pub struct MockConnection {
    domains: RwLock<HashMap<String, MockDomain>>,
    pools: RwLock<HashMap<String, MockPool>>,
    next_id: AtomicU32,
    volume_quota_gb: RwLock<Option<u64>>,
}

struct MockDomain {
    config: DomainConfig,
    state: ApplianceState,
    id: Option<u32>,
    ignores_shutdown: bool,
}

struct MockPool {
    path: PathBuf,
    active: bool,
    autostart: bool,
    volumes: HashMap<String, VolumeRecord>,
}

struct VolumeRecord {
    path: PathBuf,
    capacity_gb: u64,
}

impl MockConnection {
    /// Create a new mock backend.
    pub fn new() -> Self {
        info!("Creating mock hypervisor backend");
        Self {
            domains: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            volume_quota_gb: RwLock::new(None),
        }
    }

    /// Cap the total volume capacity the mock will accept across all pools.
    ///
    /// Requests past the cap fail with `VolumeCreateFailed`, which is how
    /// tests drive the create-time rollback paths.
    pub fn set_volume_quota_gb(&self, quota: Option<u64>) {
        let mut guard = self
            .volume_quota_gb
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *guard = quota;
    }

    /// Make a domain accept graceful shutdown requests without ever
    /// powering off, the way a hung guest would.
    pub fn set_ignores_shutdown(&self, name: &str, ignores: bool) -> Result<()> {
        let mut domains = self
            .domains
            .write()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let domain = domains
            .get_mut(name)
            .ok_or_else(|| HypervisorError::NotFound(name.to_string()))?;
        domain.ignores_shutdown = ignores;
        Ok(())
    }

    fn used_capacity_gb(pools: &HashMap<String, MockPool>) -> u64 {
        pools
            .values()
            .flat_map(|p| p.volumes.values())
            .map(|v| v.capacity_gb)
            .sum()
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Hypervisor for MockConnection {
    fn list_domains(&self) -> Result<Vec<DomainSummary>> {
        let domains = self
            .domains
            .read()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let mut result: Vec<DomainSummary> = domains
            .iter()
            .map(|(name, d)| DomainSummary {
                name: name.clone(),
                id: d.id,
                state: d.state,
            })
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(count = result.len(), "Listed mock domains");
        Ok(result)
    }

    fn lookup_domain(&self, name: &str) -> Result<Option<DomainSummary>> {
        let domains = self
            .domains
            .read()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        Ok(domains.get(name).map(|d| DomainSummary {
            name: name.to_string(),
            id: d.id,
            state: d.state,
        }))
    }

    fn lookup_domain_by_id(&self, id: u32) -> Result<Option<DomainSummary>> {
        let domains = self
            .domains
            .read()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        Ok(domains
            .iter()
            .find(|(_, d)| d.id == Some(id))
            .map(|(name, d)| DomainSummary {
                name: name.clone(),
                id: d.id,
                state: d.state,
            }))
    }

    #[instrument(skip(self, config), fields(domain = %config.name))]
    fn define_domain(&self, config: &DomainConfig) -> Result<()> {
        let mut domains = self
            .domains
            .write()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        // Redefining an existing domain updates its config in place, the
        // same way libvirt treats a repeated defineXML.
        if let Some(existing) = domains.get_mut(&config.name) {
            existing.config = config.clone();
        } else {
            domains.insert(
                config.name.clone(),
                MockDomain {
                    config: config.clone(),
                    state: ApplianceState::ShutOff,
                    id: None,
                    ignores_shutdown: false,
                },
            );
        }

        info!("Mock domain defined");
        Ok(())
    }

    #[instrument(skip(self), fields(domain = %name))]
    fn start_domain(&self, name: &str) -> Result<()> {
        let mut domains = self
            .domains
            .write()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let domain = domains
            .get_mut(name)
            .ok_or_else(|| HypervisorError::NotFound(name.to_string()))?;

        if domain.state == ApplianceState::Running {
            return Err(HypervisorError::InvalidState(format!(
                "domain {} is already running",
                name
            )));
        }

        domain.state = ApplianceState::Running;
        domain.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));

        info!("Mock domain started");
        Ok(())
    }

    #[instrument(skip(self), fields(domain = %name))]
    fn shutdown_domain(&self, name: &str) -> Result<()> {
        let mut domains = self
            .domains
            .write()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let domain = domains
            .get_mut(name)
            .ok_or_else(|| HypervisorError::NotFound(name.to_string()))?;

        if domain.state != ApplianceState::Running {
            return Err(HypervisorError::InvalidState(format!(
                "domain {} is not running",
                name
            )));
        }

        if domain.ignores_shutdown {
            // The request is delivered but the guest never acts on it.
            debug!("Mock domain ignoring graceful shutdown request");
            return Ok(());
        }

        domain.state = ApplianceState::ShutOff;
        domain.id = None;

        info!("Mock domain shut down");
        Ok(())
    }

    fn is_domain_active(&self, name: &str) -> Result<bool> {
        let domains = self
            .domains
            .read()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let domain = domains
            .get(name)
            .ok_or_else(|| HypervisorError::NotFound(name.to_string()))?;

        Ok(matches!(
            domain.state,
            ApplianceState::Running
                | ApplianceState::Idle
                | ApplianceState::Paused
                | ApplianceState::InShutdown
        ))
    }

    fn domain_xml(&self, name: &str) -> Result<String> {
        let domains = self
            .domains
            .read()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let domain = domains
            .get(name)
            .ok_or_else(|| HypervisorError::NotFound(name.to_string()))?;

        Ok(DomainXmlBuilder::new(&domain.config).build())
    }

    #[instrument(skip(self), fields(domain = %name))]
    fn undefine_domain(&self, name: &str) -> Result<()> {
        let mut domains = self
            .domains
            .write()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let domain = domains
            .get(name)
            .ok_or_else(|| HypervisorError::NotFound(name.to_string()))?;

        if domain.state == ApplianceState::Running {
            return Err(HypervisorError::InvalidState(format!(
                "domain {} must be shut off before undefine",
                name
            )));
        }

        domains.remove(name);

        info!("Mock domain undefined");
        Ok(())
    }

    fn interface_addresses(&self, name: &str) -> Result<Vec<InterfaceInfo>> {
        let domains = self
            .domains
            .read()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let domain = domains
            .get(name)
            .ok_or_else(|| HypervisorError::NotFound(name.to_string()))?;

        let Some(id) = domain.id else {
            return Ok(Vec::new());
        };

        // A loopback-style entry plus one leased interface, mirroring what
        // the DHCP lease query reports for a booted guest.
        Ok(vec![
            InterfaceInfo {
                hwaddr: "00:00:00:00:00:00".to_string(),
                addrs: vec!["127.0.0.1".to_string()],
            },
            InterfaceInfo {
                hwaddr: format!("52:54:00:4d:51:{:02x}", id % 256),
                addrs: vec![format!("192.168.122.{}", 100 + id % 150)],
            },
        ])
    }

    fn lookup_pool(&self, name: &str) -> Result<Option<PoolInfo>> {
        let pools = self
            .pools
            .read()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        Ok(pools.get(name).map(|p| PoolInfo {
            name: name.to_string(),
            path: p.path.clone(),
            active: p.active,
            autostart: p.autostart,
        }))
    }

    #[instrument(skip(self, config), fields(pool = %config.name))]
    fn define_pool(&self, config: &PoolConfig) -> Result<()> {
        let mut pools = self
            .pools
            .write()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        if pools.contains_key(&config.name) {
            return Err(HypervisorError::PoolFailed(format!(
                "pool {} already defined",
                config.name
            )));
        }

        pools.insert(
            config.name.clone(),
            MockPool {
                path: config.path.clone(),
                active: false,
                autostart: false,
                volumes: HashMap::new(),
            },
        );

        info!("Mock pool defined");
        Ok(())
    }

    fn activate_pool(&self, name: &str) -> Result<()> {
        let mut pools = self
            .pools
            .write()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let pool = pools
            .get_mut(name)
            .ok_or_else(|| HypervisorError::PoolFailed(format!("pool {} not defined", name)))?;
        pool.active = true;
        Ok(())
    }

    fn set_pool_autostart(&self, name: &str) -> Result<()> {
        let mut pools = self
            .pools
            .write()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let pool = pools
            .get_mut(name)
            .ok_or_else(|| HypervisorError::PoolFailed(format!("pool {} not defined", name)))?;
        pool.autostart = true;
        Ok(())
    }

    #[instrument(skip(self, request), fields(pool = %pool, volume = %request.file_name()))]
    fn create_volume(&self, pool: &str, request: &VolumeRequest) -> Result<()> {
        let mut pools = self
            .pools
            .write()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let quota = {
            let guard = self
                .volume_quota_gb
                .read()
                .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;
            *guard
        };
        if let Some(quota) = quota {
            let used = Self::used_capacity_gb(&pools);
            if used + request.capacity_gb > quota {
                return Err(HypervisorError::VolumeCreateFailed(format!(
                    "pool {} out of space: {}G requested, {}G of {}G used",
                    pool, request.capacity_gb, used, quota
                )));
            }
        }

        let entry = pools
            .get_mut(pool)
            .ok_or_else(|| HypervisorError::PoolFailed(format!("pool {} not defined", pool)))?;

        let file_name = request.file_name();
        if entry.volumes.contains_key(&file_name) {
            return Err(HypervisorError::VolumeCreateFailed(format!(
                "volume {} already exists in pool {}",
                file_name, pool
            )));
        }

        let path = entry.path.join(&file_name);
        fs::File::create(&path)
            .map_err(|e| HypervisorError::VolumeCreateFailed(format!("{}: {}", path.display(), e)))?;

        entry.volumes.insert(
            file_name,
            VolumeRecord {
                path,
                capacity_gb: request.capacity_gb,
            },
        );

        info!("Mock volume created");
        Ok(())
    }

    fn list_volumes(&self, pool: &str) -> Result<Vec<VolumeInfo>> {
        let pools = self
            .pools
            .read()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let entry = pools
            .get(pool)
            .ok_or_else(|| HypervisorError::PoolFailed(format!("pool {} not defined", pool)))?;

        let mut result: Vec<VolumeInfo> = entry
            .volumes
            .iter()
            .map(|(name, v)| VolumeInfo {
                name: name.clone(),
                path: v.path.clone(),
            })
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    #[instrument(skip(self), fields(pool = %pool, volume = %volume))]
    fn delete_volume(&self, pool: &str, volume: &str) -> Result<()> {
        let mut pools = self
            .pools
            .write()
            .map_err(|_| HypervisorError::Internal("Lock poisoned".to_string()))?;

        let entry = pools
            .get_mut(pool)
            .ok_or_else(|| HypervisorError::PoolFailed(format!("pool {} not defined", pool)))?;

        let record = entry
            .volumes
            .remove(volume)
            .ok_or_else(|| HypervisorError::NotFound(format!("volume {} in pool {}", volume, pool)))?;

        if record.path.exists() {
            fs::remove_file(&record.path)
                .map_err(|e| HypervisorError::Internal(format!("{}: {}", record.path.display(), e)))?;
        }

        info!("Mock volume deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pool_config(dir: &TempDir) -> PoolConfig {
        PoolConfig {
            name: "default".to_string(),
            path: dir.path().to_path_buf(),
        }
    }

    fn domain_config(dir: &TempDir, name: &str) -> DomainConfig {
        DomainConfig::new(
            name,
            dir.path().join(format!("{}.qc2", name)),
            dir.path().join(format!("{}-db.qc2", name)),
        )
    }

    #[test]
    fn domain_lifecycle() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();

        conn.define_domain(&domain_config(&dir, "cfme-59")).unwrap();
        let summary = conn.lookup_domain("cfme-59").unwrap().unwrap();
        assert_eq!(summary.state, ApplianceState::ShutOff);
        assert_eq!(summary.id, None);

        conn.start_domain("cfme-59").unwrap();
        let summary = conn.lookup_domain("cfme-59").unwrap().unwrap();
        assert_eq!(summary.state, ApplianceState::Running);
        assert!(summary.id.is_some());
        assert!(conn.is_domain_active("cfme-59").unwrap());

        let by_id = conn
            .lookup_domain_by_id(summary.id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(by_id.name, "cfme-59");

        conn.shutdown_domain("cfme-59").unwrap();
        assert!(!conn.is_domain_active("cfme-59").unwrap());

        conn.undefine_domain("cfme-59").unwrap();
        assert!(conn.lookup_domain("cfme-59").unwrap().is_none());
    }

    #[test]
    fn undefine_refuses_running_domain() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();

        conn.define_domain(&domain_config(&dir, "busy")).unwrap();
        conn.start_domain("busy").unwrap();

        let err = conn.undefine_domain("busy").unwrap_err();
        assert!(matches!(err, HypervisorError::InvalidState(_)));
    }

    #[test]
    fn stubborn_domain_survives_shutdown() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();

        conn.define_domain(&domain_config(&dir, "hung")).unwrap();
        conn.start_domain("hung").unwrap();
        conn.set_ignores_shutdown("hung", true).unwrap();

        conn.shutdown_domain("hung").unwrap();
        assert!(conn.is_domain_active("hung").unwrap());
    }

    #[test]
    fn addresses_only_while_running() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();

        conn.define_domain(&domain_config(&dir, "net")).unwrap();
        assert!(conn.interface_addresses("net").unwrap().is_empty());

        conn.start_domain("net").unwrap();
        let ifaces = conn.interface_addresses("net").unwrap();
        assert_eq!(ifaces.len(), 2);
        assert_eq!(ifaces[0].hwaddr, "00:00:00:00:00:00");
        assert!(ifaces[1].addrs[0].starts_with("192.168.122."));
    }

    #[test]
    fn volume_files_are_materialized() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();

        conn.define_pool(&pool_config(&dir)).unwrap();
        conn.activate_pool("default").unwrap();

        let request = VolumeRequest::new("cfme-59-db", 5, "qc2");
        conn.create_volume("default", &request).unwrap();

        let path = dir.path().join("cfme-59-db.qc2");
        assert!(path.exists());

        let volumes = conn.list_volumes("default").unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "cfme-59-db.qc2");

        conn.delete_volume("default", "cfme-59-db.qc2").unwrap();
        assert!(!path.exists());
        assert!(conn.list_volumes("default").unwrap().is_empty());
    }

    #[test]
    fn volume_quota_is_enforced() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();
        conn.set_volume_quota_gb(Some(8));

        conn.define_pool(&pool_config(&dir)).unwrap();
        conn.create_volume("default", &VolumeRequest::new("a-db", 5, "qc2"))
            .unwrap();

        let err = conn
            .create_volume("default", &VolumeRequest::new("b-db", 5, "qc2"))
            .unwrap_err();
        assert!(matches!(err, HypervisorError::VolumeCreateFailed(_)));
    }

    #[test]
    fn domain_xml_reports_disks() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();

        conn.define_domain(&domain_config(&dir, "cfme-59")).unwrap();
        let xml = conn.domain_xml("cfme-59").unwrap();

        let sources = crate::xml::disk_sources(&xml).unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources[0].ends_with("cfme-59.qc2"));
        assert!(sources[1].ends_with("cfme-59-db.qc2"));
    }
}
