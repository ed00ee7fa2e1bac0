//! Appliance lifecycle orchestration.
//!
//! The manager drives one appliance at a time through
//! `absent -> defined -> running -> shut off -> absent`: it stages the base
//! disk, materializes the database volume, defines and starts the domain,
//! and tears everything down again in `kill`. Creation rolls back the
//! steps of the current attempt only; once a domain is defined its disks
//! belong to it and are reclaimed through `kill`, not through rollback.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::error::{HypervisorError, Result};
use crate::pool::ResourcePool;
use crate::traits::Hypervisor;
use crate::types::{
    Appliance, ApplianceSpec, ApplianceState, CleanupReport, Description, DomainConfig,
    DomainSummary, VolumeRequest,
};
use crate::xml;

/// How long `kill` waits for a graceful shutdown to land.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(180);
/// Interval between state probes in the wait loops.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long to wait for a freshly started appliance to lease an address.
pub const DEFAULT_ADDRESS_WAIT: Duration = Duration::from_secs(120);

/// The all-zero hardware address the loopback interface reports.
const NULL_HWADDR: &str = "00:00:00:00:00:00";

/// Manager tunables.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Storage pool holding appliance disks
    pub pool_name: String,
    /// Backing directory for a first-time pool define
    pub pool_path: PathBuf,
    /// Directory with downloaded base images
    pub image_dir: PathBuf,
    pub shutdown_timeout: Duration,
    pub poll_interval: Duration,
    pub address_wait: Duration,
}

impl ManagerSettings {
    pub fn new(
        pool_name: impl Into<String>,
        pool_path: impl Into<PathBuf>,
        image_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pool_name: pool_name.into(),
            pool_path: pool_path.into(),
            image_dir: image_dir.into(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            address_wait: DEFAULT_ADDRESS_WAIT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_address_wait(mut self, wait: Duration) -> Self {
        self.address_wait = wait;
        self
    }
}

/// Orchestrates appliance lifecycle against one hypervisor connection.
pub struct ApplianceManager<H: Hypervisor> {
    hv: H,
    settings: ManagerSettings,
}

impl<H: Hypervisor> ApplianceManager<H> {
    pub fn new(hv: H, settings: ManagerSettings) -> Self {
        Self { hv, settings }
    }

    pub fn hypervisor(&self) -> &H {
        &self.hv
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Create an appliance: stage the base disk, create the database
    /// volume, define the domain. The new domain is left shut off; callers
    /// follow up with [`start`](Self::start).
    ///
    /// Failure semantics per step:
    /// - image missing: no work has been done at all
    /// - staging failed: any partial copy is removed
    /// - volume creation failed: the staged base disk is removed
    /// - define failed: both disks are removed, nothing owns them yet
    #[instrument(skip(self, spec), fields(appliance = %spec.name, image = %spec.image))]
    pub fn create(&self, spec: &ApplianceSpec) -> Result<Appliance> {
        let source = self.settings.image_dir.join(&spec.image);
        if !source.is_file() {
            return Err(HypervisorError::ImageNotFound(source.display().to_string()));
        }

        let pool =
            ResourcePool::ensure(&self.hv, &self.settings.pool_name, &self.settings.pool_path)?;

        let base_disk = pool.path().join(spec.base_disk_name());
        info!(target_disk = %base_disk.display(), "Staging base disk");
        if let Err(e) = fs::copy(&source, &base_disk) {
            let _ = fs::remove_file(&base_disk);
            return Err(HypervisorError::StageFailed(format!(
                "{}: {}",
                base_disk.display(),
                e
            )));
        }

        let request = VolumeRequest::new(
            spec.db_volume_name(),
            spec.db_size_gb,
            spec.stream.disk_format(),
        );
        let data_disk = match pool.create_volume(&request) {
            Ok(path) => path,
            Err(e) => {
                warn!("Database volume creation failed, removing staged base disk");
                if let Err(rm) = fs::remove_file(&base_disk) {
                    warn!(path = %base_disk.display(), error = %rm, "Staged base disk not removed");
                }
                return Err(e);
            }
        };

        let config = DomainConfig::new(&spec.name, base_disk.clone(), data_disk)
            .with_description(spec.description().to_string())
            .with_memory_gb(spec.memory_gb)
            .with_vcpus(spec.cpu);
        if let Err(e) = self.hv.define_domain(&config) {
            warn!("Define failed, removing both disks");
            if let Err(rm) = pool.delete_volume(&request.file_name()) {
                warn!(volume = %request.file_name(), error = %rm, "Database volume not removed");
            }
            if let Err(rm) = fs::remove_file(&base_disk) {
                warn!(path = %base_disk.display(), error = %rm, "Staged base disk not removed");
            }
            return Err(e);
        }

        info!("Appliance created");
        Ok(Appliance {
            name: spec.name.clone(),
            id: None,
            state: ApplianceState::ShutOff,
            address: None,
            description: Some(spec.description()),
        })
    }

    /// Start an appliance. Returns `false` when it was already running.
    #[instrument(skip(self))]
    pub fn start(&self, key: &str) -> Result<bool> {
        let summary = self.require(key)?;
        if self.hv.is_domain_active(&summary.name)? {
            debug!(appliance = %summary.name, "Already running");
            return Ok(false);
        }
        self.hv.start_domain(&summary.name)?;
        info!(appliance = %summary.name, "Appliance started");
        Ok(true)
    }

    /// Send a graceful shutdown. Returns `false` when the appliance was
    /// not running; never waits for the shutdown to complete.
    #[instrument(skip(self))]
    pub fn stop(&self, key: &str) -> Result<bool> {
        let summary = self.require(key)?;
        if !self.hv.is_domain_active(&summary.name)? {
            debug!(appliance = %summary.name, "Not running");
            return Ok(false);
        }
        self.hv.shutdown_domain(&summary.name)?;
        info!(appliance = %summary.name, "Shutdown requested");
        Ok(true)
    }

    /// Destroy an appliance: shut it down if needed, delete every disk the
    /// domain definition references, then undefine the domain.
    ///
    /// The shutdown wait is bounded; past the deadline `ShutdownTimeout`
    /// comes back and nothing has been deleted. Disks tracked by the pool
    /// are deleted through it; anything else is removed from the
    /// filesystem directly. The domain is undefined only after all disks
    /// are processed, while its XML can still name them.
    #[instrument(skip(self))]
    pub fn kill(&self, key: &str) -> Result<CleanupReport> {
        let summary = self.require(key)?;
        let name = summary.name;

        if self.hv.is_domain_active(&name)? {
            self.hv.shutdown_domain(&name)?;
            self.wait_for_shutdown(&name)?;
        }

        let domain_xml = self.hv.domain_xml(&name)?;
        let sources = xml::disk_sources(&domain_xml)?;

        let tracked: HashSet<String> = match self.hv.lookup_pool(&self.settings.pool_name)? {
            Some(info) => self
                .hv
                .list_volumes(&info.name)?
                .into_iter()
                .map(|v| v.name)
                .collect(),
            None => {
                debug!(pool = %self.settings.pool_name, "Pool not defined, no tracked volumes");
                HashSet::new()
            }
        };

        let mut report = CleanupReport::default();
        for source in sources {
            let base = source
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_owned);
            match base {
                Some(volume) if tracked.contains(&volume) => {
                    self.hv.delete_volume(&self.settings.pool_name, &volume)?;
                    debug!(volume = %volume, "Deleted tracked volume");
                    report.pool_deleted.push(volume);
                }
                _ => match fs::remove_file(&source) {
                    Ok(()) => {
                        debug!(path = %source.display(), "Removed untracked disk");
                        report.removed_directly.push(source.display().to_string());
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        debug!(path = %source.display(), "Disk already absent");
                    }
                    Err(e) => {
                        warn!(path = %source.display(), error = %e, "Direct disk removal failed");
                    }
                },
            }
        }

        self.hv.undefine_domain(&name)?;
        info!(
            appliance = %name,
            disks_removed = report.len(),
            "Appliance destroyed"
        );
        Ok(report)
    }

    /// All appliances, optionally restricted to one lifecycle state.
    pub fn appliances(&self, status: Option<ApplianceState>) -> Result<Vec<Appliance>> {
        let mut result = Vec::new();
        for summary in self.hv.list_domains()? {
            if let Some(wanted) = status {
                if summary.state != wanted {
                    continue;
                }
            }
            result.push(self.appliance_from_summary(summary)?);
        }
        Ok(result)
    }

    /// Look up one appliance. Numeric keys resolve by domain id first,
    /// everything else by name. `None` when nothing matches (or the match
    /// is not in the requested state).
    pub fn get(&self, key: &str, status: Option<ApplianceState>) -> Result<Option<Appliance>> {
        let Some(summary) = self.resolve(key)? else {
            return Ok(None);
        };
        if let Some(wanted) = status {
            if summary.state != wanted {
                return Ok(None);
            }
        }
        Ok(Some(self.appliance_from_summary(summary)?))
    }

    /// Current non-loopback dotted-quad address, if one is leased.
    pub fn address(&self, name: &str) -> Result<Option<String>> {
        for iface in self.hv.interface_addresses(name)? {
            if iface.hwaddr == NULL_HWADDR {
                continue;
            }
            for addr in iface.addrs {
                if addr.chars().filter(|c| *c == '.').count() == 3 {
                    return Ok(Some(addr));
                }
            }
        }
        Ok(None)
    }

    /// Poll for an address until the configured deadline. `None` means the
    /// appliance never leased one in time; that is the caller's signal,
    /// not an error.
    #[instrument(skip(self))]
    pub fn wait_for_address(&self, key: &str) -> Result<Option<String>> {
        let summary = self.require(key)?;
        let deadline = Instant::now() + self.settings.address_wait;

        loop {
            if let Some(addr) = self.address(&summary.name)? {
                info!(appliance = %summary.name, address = %addr, "Address leased");
                return Ok(Some(addr));
            }
            if Instant::now() >= deadline {
                debug!(appliance = %summary.name, "No address before deadline");
                return Ok(None);
            }
            thread::sleep(self.settings.poll_interval);
        }
    }

    fn resolve(&self, key: &str) -> Result<Option<DomainSummary>> {
        if let Ok(id) = key.parse::<u32>() {
            if let Some(summary) = self.hv.lookup_domain_by_id(id)? {
                return Ok(Some(summary));
            }
        }
        self.hv.lookup_domain(key)
    }

    fn require(&self, key: &str) -> Result<DomainSummary> {
        self.resolve(key)?
            .ok_or_else(|| HypervisorError::NotFound(key.to_string()))
    }

    fn appliance_from_summary(&self, summary: DomainSummary) -> Result<Appliance> {
        let description = xml::description(&self.hv.domain_xml(&summary.name)?)?
            .and_then(|text| Description::parse(&text));
        let address = if summary.state == ApplianceState::Running {
            self.address(&summary.name)?
        } else {
            None
        };
        Ok(Appliance {
            name: summary.name,
            id: summary.id,
            state: summary.state,
            address,
            description,
        })
    }

    fn wait_for_shutdown(&self, name: &str) -> Result<()> {
        let deadline = Instant::now() + self.settings.shutdown_timeout;
        while self.hv.is_domain_active(name)? {
            if Instant::now() >= deadline {
                return Err(HypervisorError::ShutdownTimeout(
                    name.to_string(),
                    self.settings.shutdown_timeout.as_secs(),
                ));
            }
            thread::sleep(self.settings.poll_interval);
        }
        Ok(())
    }
}
