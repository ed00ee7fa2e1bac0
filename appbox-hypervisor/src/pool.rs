//! Storage pool management.
//!
//! Appliance disks live in a single directory-backed pool. `ensure` brings
//! that pool up no matter how much of it already exists: the backing
//! directory, the libvirt definition, activation and autostart are each
//! applied only when missing, so repeated calls are safe.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{HypervisorError, Result};
use crate::traits::Hypervisor;
use crate::types::{PoolConfig, PoolInfo, VolumeInfo, VolumeRequest};

/// Handle to a named storage pool.
pub struct ResourcePool<'a, H: Hypervisor + ?Sized> {
    hv: &'a H,
    info: PoolInfo,
}

impl<'a, H: Hypervisor + ?Sized> ResourcePool<'a, H> {
    /// Bring the pool to active-with-autostart, creating whatever is
    /// missing along the way.
    ///
    /// When the pool is already defined its recorded target path wins over
    /// `path`; the caller's value is only used for a first-time define.
    pub fn ensure(hv: &'a H, name: &str, path: &Path) -> Result<Self> {
        let existing = hv.lookup_pool(name)?;

        let path = match &existing {
            Some(info) => info.path.clone(),
            None => path.to_path_buf(),
        };

        fs::create_dir_all(&path)
            .map_err(|e| HypervisorError::PoolFailed(format!("{}: {}", path.display(), e)))?;

        if existing.is_none() {
            hv.define_pool(&PoolConfig {
                name: name.to_string(),
                path: path.clone(),
            })?;
            info!(pool = %name, path = %path.display(), "Storage pool defined");
        }

        let info = hv
            .lookup_pool(name)?
            .ok_or_else(|| HypervisorError::PoolFailed(format!("pool {} missing after define", name)))?;

        if !info.active {
            hv.activate_pool(name)?;
            debug!(pool = %name, "Storage pool activated");
        }
        if !info.autostart {
            hv.set_pool_autostart(name)?;
            debug!(pool = %name, "Storage pool autostart enabled");
        }

        Ok(Self {
            hv,
            info: PoolInfo {
                active: true,
                autostart: true,
                ..info
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    /// Create a volume and return the path it will occupy in the pool.
    pub fn create_volume(&self, request: &VolumeRequest) -> Result<PathBuf> {
        self.hv.create_volume(&self.info.name, request)?;
        Ok(self.info.path.join(request.file_name()))
    }

    /// Delete a volume by file name, e.g. `cfme-59-db.qc2`.
    pub fn delete_volume(&self, file_name: &str) -> Result<()> {
        self.hv.delete_volume(&self.info.name, file_name)
    }

    /// All volumes the pool currently tracks.
    pub fn volumes(&self) -> Result<Vec<VolumeInfo>> {
        self.hv.list_volumes(&self.info.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnection;
    use tempfile::TempDir;

    #[test]
    fn ensure_brings_pool_up() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();
        let target = dir.path().join("images");

        let pool = ResourcePool::ensure(&conn, "default", &target).unwrap();
        assert_eq!(pool.name(), "default");
        assert_eq!(pool.path(), target.as_path());
        assert!(target.is_dir());

        let info = conn.lookup_pool("default").unwrap().unwrap();
        assert!(info.active);
        assert!(info.autostart);
    }

    #[test]
    fn ensure_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();
        let target = dir.path().join("images");

        ResourcePool::ensure(&conn, "default", &target).unwrap();
        // A second call must not re-define the pool; the mock rejects
        // duplicate defines.
        ResourcePool::ensure(&conn, "default", &target).unwrap();
    }

    #[test]
    fn ensure_keeps_existing_path() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();
        let first = dir.path().join("first");
        let second = dir.path().join("second");

        ResourcePool::ensure(&conn, "default", &first).unwrap();
        let pool = ResourcePool::ensure(&conn, "default", &second).unwrap();

        assert_eq!(pool.path(), first.as_path());
        assert!(!second.exists());
    }

    #[test]
    fn volumes_round_trip() {
        let dir = TempDir::new().unwrap();
        let conn = MockConnection::new();
        let pool = ResourcePool::ensure(&conn, "default", dir.path()).unwrap();

        let request = VolumeRequest::new("cfme-59-db", 5, "qc2");
        let path = pool.create_volume(&request).unwrap();
        assert_eq!(path, dir.path().join("cfme-59-db.qc2"));
        assert!(path.exists());

        let volumes = pool.volumes().unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "cfme-59-db.qc2");
        assert_eq!(volumes[0].path, path);

        pool.delete_volume("cfme-59-db.qc2").unwrap();
        assert!(pool.volumes().unwrap().is_empty());
    }
}
