//! Type definitions for appliance specs, domain state and storage records.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// APPLIANCE SPEC
// =============================================================================

/// Everything needed to provision one appliance. Immutable once submitted
/// to `ApplianceManager::create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplianceSpec {
    /// Appliance (and domain) name
    pub name: String,
    /// Base image file name in local image storage
    pub image: String,
    /// Number of vCPUs
    pub cpu: u32,
    /// Memory size in GB
    pub memory_gb: u64,
    /// Database disk size in GB
    pub db_size_gb: u64,
    /// Release stream
    pub stream: Stream,
    /// Provider tag stored in the domain description
    pub provider: String,
    /// Appliance version string
    pub version: String,
}

impl ApplianceSpec {
    /// Create a spec with default sizing.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cpu: 1,
            memory_gb: 4,
            db_size_gb: 5,
            stream: Stream::Community,
            provider: "kvm".to_string(),
            version: String::new(),
        }
    }

    /// Set the number of vCPUs.
    pub fn with_cpu(mut self, cpu: u32) -> Self {
        self.cpu = cpu;
        self
    }

    /// Set the memory size in GB.
    pub fn with_memory_gb(mut self, memory_gb: u64) -> Self {
        self.memory_gb = memory_gb;
        self
    }

    /// Set the database disk size in GB.
    pub fn with_db_size_gb(mut self, db_size_gb: u64) -> Self {
        self.db_size_gb = db_size_gb;
        self
    }

    /// Set the release stream.
    pub fn with_stream(mut self, stream: Stream) -> Self {
        self.stream = stream;
        self
    }

    /// Set the provider tag.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Set the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// File name of the staged base disk for this appliance.
    pub fn base_disk_name(&self) -> String {
        format!("{}.{}", self.name, self.stream.disk_format())
    }

    /// Volume name of the database disk (extension added by the pool).
    pub fn db_volume_name(&self) -> String {
        format!("{}-db", self.name)
    }

    /// Description text persisted into the domain definition.
    pub fn description(&self) -> Description {
        Description {
            stream: self.stream,
            provider: self.provider.clone(),
            version: self.version.clone(),
        }
    }
}

/// Release stream of the appliance product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Community,
    Enterprise,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Community => "community",
            Stream::Enterprise => "enterprise",
        }
    }

    /// Disk image extension used by this stream.
    pub fn disk_format(&self) -> &'static str {
        match self {
            Stream::Community => "qc2",
            Stream::Enterprise => "qcow2",
        }
    }

    /// Classify an image file name. Community builds carry the `manageiq`
    /// prefix; everything else is an enterprise build.
    pub fn from_image_name(image: &str) -> Stream {
        if image.starts_with("manageiq") {
            Stream::Community
        } else {
            Stream::Enterprise
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stream {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "community" => Ok(Stream::Community),
            "enterprise" => Ok(Stream::Enterprise),
            other => Err(format!("unknown stream '{}'", other)),
        }
    }
}

/// The `stream-provider-version` text stored in the domain's description
/// field, recovered when listing appliances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub stream: Stream,
    pub provider: String,
    pub version: String,
}

impl Description {
    /// Parse a description field. The version part may itself contain
    /// dashes, so only the first two separators split.
    pub fn parse(text: &str) -> Option<Description> {
        let mut parts = text.splitn(3, '-');
        let stream = parts.next()?.parse().ok()?;
        let provider = parts.next()?.to_string();
        let version = parts.next()?.to_string();
        Some(Description {
            stream,
            provider,
            version,
        })
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.stream, self.provider, self.version)
    }
}

// =============================================================================
// DOMAIN STATE
// =============================================================================

/// Appliance lifecycle state as reported by the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplianceState {
    NoState,
    Running,
    /// Blocked on a resource, reported as idle.
    Idle,
    Paused,
    InShutdown,
    ShutOff,
    Crashed,
}

impl ApplianceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplianceState::NoState => "no-state",
            ApplianceState::Running => "running",
            ApplianceState::Idle => "idle",
            ApplianceState::Paused => "paused",
            ApplianceState::InShutdown => "in-shutdown",
            ApplianceState::ShutOff => "shut-off",
            ApplianceState::Crashed => "crashed",
        }
    }
}

impl fmt::Display for ApplianceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplianceState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "no-state" => Ok(ApplianceState::NoState),
            "running" => Ok(ApplianceState::Running),
            "idle" => Ok(ApplianceState::Idle),
            "paused" => Ok(ApplianceState::Paused),
            "in-shutdown" => Ok(ApplianceState::InShutdown),
            "shut-off" => Ok(ApplianceState::ShutOff),
            "crashed" => Ok(ApplianceState::Crashed),
            other => Err(format!("unknown appliance state '{}'", other)),
        }
    }
}

/// One appliance as seen through the manager: domain identity plus the
/// metadata cached from the hypervisor at lookup time.
#[derive(Debug, Clone, Serialize)]
pub struct Appliance {
    /// Domain name
    pub name: String,
    /// Numeric domain id, present only while the domain runs
    pub id: Option<u32>,
    /// Lifecycle state at lookup time
    pub state: ApplianceState,
    /// Leased dotted-quad address, if one has been assigned
    pub address: Option<String>,
    /// Parsed description field, if the domain carries one
    pub description: Option<Description>,
}

// =============================================================================
// HYPERVISOR RECORDS
// =============================================================================

/// Identity and state of one defined domain.
#[derive(Debug, Clone)]
pub struct DomainSummary {
    pub name: String,
    pub id: Option<u32>,
    pub state: ApplianceState,
}

/// One guest network interface with its leased addresses.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    /// Hardware address; all zeros for the loopback interface
    pub hwaddr: String,
    pub addrs: Vec<String>,
}

/// Storage pool record.
#[derive(Debug, Clone)]
pub struct PoolInfo {
    pub name: String,
    pub path: PathBuf,
    pub active: bool,
    pub autostart: bool,
}

/// One volume tracked by a pool.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    /// Volume file name, e.g. `cfme-59-db.qc2`
    pub name: String,
    pub path: PathBuf,
}

// =============================================================================
// DESCRIPTORS
// =============================================================================

/// Directory-backed storage pool descriptor.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub name: String,
    pub path: PathBuf,
}

/// Volume descriptor submitted to a pool.
///
/// Ownership and permission bits are fixed by the XML builder to the values
/// the appliance OS image expects; callers only choose name, size and the
/// file-name format suffix.
#[derive(Debug, Clone)]
pub struct VolumeRequest {
    /// Volume name without extension, e.g. `cfme-59-db`
    pub name: String,
    /// File-name suffix (`qc2` or `qcow2`)
    pub format: String,
    /// Capacity in GB
    pub capacity_gb: u64,
}

impl VolumeRequest {
    pub fn new(name: impl Into<String>, capacity_gb: u64, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            capacity_gb,
        }
    }

    /// File name the pool materializes for this volume.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.format)
    }
}

/// Domain descriptor.
///
/// Both disks must exist before the domain is defined; taking them in the
/// constructor keeps that ordering visible at the call site.
#[derive(Debug, Clone)]
pub struct DomainConfig {
    pub name: String,
    /// Free-text description, `stream-provider-version`
    pub description: String,
    pub memory_gb: u64,
    pub vcpus: u32,
    /// Staged base image disk
    pub base_disk: PathBuf,
    /// Database volume disk
    pub data_disk: PathBuf,
    /// Virtual network name
    pub network: String,
    /// Bridge device of the virtual network
    pub bridge: String,
}

impl DomainConfig {
    pub fn new(name: impl Into<String>, base_disk: PathBuf, data_disk: PathBuf) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            memory_gb: 4,
            vcpus: 1,
            base_disk,
            data_disk,
            network: "default".to_string(),
            bridge: "virbr0".to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_memory_gb(mut self, memory_gb: u64) -> Self {
        self.memory_gb = memory_gb;
        self
    }

    pub fn with_vcpus(mut self, vcpus: u32) -> Self {
        self.vcpus = vcpus;
        self
    }
}

// =============================================================================
// TEARDOWN
// =============================================================================

/// What `kill` did with each disk it found in the domain definition.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Disks deleted through the pool (tracked volumes)
    pub pool_deleted: Vec<String>,
    /// Disks the pool did not track, removed from the filesystem directly
    pub removed_directly: Vec<String>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.pool_deleted.is_empty() && self.removed_directly.is_empty()
    }

    /// Total number of disks removed.
    pub fn len(&self) -> usize {
        self.pool_deleted.len() + self.removed_directly.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builder_defaults() {
        let spec = ApplianceSpec::new("cfme-59", "manageiq-59.qc2");
        assert_eq!(spec.cpu, 1);
        assert_eq!(spec.memory_gb, 4);
        assert_eq!(spec.db_size_gb, 5);
        assert_eq!(spec.stream, Stream::Community);
    }

    #[test]
    fn spec_disk_names_follow_stream() {
        let spec = ApplianceSpec::new("cfme-59", "manageiq-59.qc2")
            .with_stream(Stream::Enterprise);
        assert_eq!(spec.base_disk_name(), "cfme-59.qcow2");
        assert_eq!(spec.db_volume_name(), "cfme-59-db");
    }

    #[test]
    fn description_round_trip() {
        let desc = Description {
            stream: Stream::Enterprise,
            provider: "rhevm".to_string(),
            version: "5.11.0.1-1".to_string(),
        };
        assert_eq!(desc.to_string(), "enterprise-rhevm-5.11.0.1-1");
        let parsed = Description::parse(&desc.to_string()).unwrap();
        assert_eq!(parsed, desc);
        assert_eq!(parsed.version, "5.11.0.1-1");
    }

    #[test]
    fn description_rejects_garbage() {
        assert!(Description::parse("").is_none());
        assert!(Description::parse("just a note").is_none());
        assert!(Description::parse("community-kvm").is_none());
    }

    #[test]
    fn stream_from_image_name() {
        assert_eq!(
            Stream::from_image_name("manageiq-ovirt-jansa-1.qc2"),
            Stream::Community
        );
        assert_eq!(
            Stream::from_image_name("cfme-rhevm-5.11.0.1-1.x86_64.qcow2"),
            Stream::Enterprise
        );
    }

    #[test]
    fn state_round_trip() {
        for state in [
            ApplianceState::NoState,
            ApplianceState::Running,
            ApplianceState::Idle,
            ApplianceState::Paused,
            ApplianceState::InShutdown,
            ApplianceState::ShutOff,
            ApplianceState::Crashed,
        ] {
            assert_eq!(state.as_str().parse::<ApplianceState>().unwrap(), state);
        }
    }
}
