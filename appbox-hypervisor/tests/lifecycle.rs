//! End-to-end appliance lifecycle tests against the mock backend.

use std::fs;
use std::time::Duration;

use appbox_hypervisor::{
    ApplianceManager, ApplianceSpec, ApplianceState, ManagerSettings, MockConnection, Stream,
};
use tempfile::TempDir;

fn manager(dir: &TempDir) -> ApplianceManager<MockConnection> {
    let image_dir = dir.path().join("images");
    fs::create_dir_all(&image_dir).unwrap();
    fs::write(image_dir.join("manageiq-59.qc2"), b"base-image").unwrap();
    fs::write(image_dir.join("manageiq-60.qc2"), b"base-image").unwrap();

    let settings = ManagerSettings::new("default", dir.path().join("pool"), image_dir)
        .with_shutdown_timeout(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(10))
        .with_address_wait(Duration::from_millis(200));
    ApplianceManager::new(MockConnection::new(), settings)
}

/// Full provision-run-destroy pass for one community appliance.
#[test]
fn test_appliance_end_to_end() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);

    let spec = ApplianceSpec::new("cfme-59", "manageiq-59.qc2")
        .with_cpu(1)
        .with_memory_gb(4)
        .with_db_size_gb(5)
        .with_version("5.9.0.1");

    // Create: domain defined but shut off, both disks staged in the pool.
    let appliance = manager.create(&spec).unwrap();
    assert_eq!(appliance.state, ApplianceState::ShutOff);

    let pool_dir = dir.path().join("pool");
    assert!(pool_dir.join("cfme-59.qc2").is_file());
    assert!(pool_dir.join("cfme-59-db.qc2").is_file());

    // Start: running, with a dotted-quad address leased in time.
    assert!(manager.start("cfme-59").unwrap());
    let address = manager.wait_for_address("cfme-59").unwrap().unwrap();
    assert_eq!(address.chars().filter(|c| *c == '.').count(), 3);

    let appliance = manager.get("cfme-59", None).unwrap().unwrap();
    assert_eq!(appliance.state, ApplianceState::Running);
    assert_eq!(appliance.address.as_deref(), Some(address.as_str()));

    // Metadata round-trips through the persisted domain description.
    let desc = appliance.description.unwrap();
    assert_eq!(desc.stream, Stream::Community);
    assert_eq!(desc.provider, "kvm");
    assert_eq!(desc.version, "5.9.0.1");

    // Kill: graceful shutdown, every disk removed, domain undefined.
    let report = manager.kill("cfme-59").unwrap();
    assert_eq!(report.len(), 2);
    assert!(!pool_dir.join("cfme-59.qc2").exists());
    assert!(!pool_dir.join("cfme-59-db.qc2").exists());
    assert!(manager.get("cfme-59", None).unwrap().is_none());
    assert!(manager.appliances(None).unwrap().is_empty());
}

/// Appliances provisioned one after another share the same pool, and
/// destroying one leaves the other's disks alone.
#[test]
fn test_sequential_appliances_share_pool() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);

    manager
        .create(&ApplianceSpec::new("cfme-59", "manageiq-59.qc2").with_version("5.9.0.1"))
        .unwrap();
    manager
        .create(&ApplianceSpec::new("cfme-60", "manageiq-60.qc2").with_version("5.11.0.1"))
        .unwrap();

    manager.start("cfme-59").unwrap();
    manager.start("cfme-60").unwrap();

    let running = manager.appliances(Some(ApplianceState::Running)).unwrap();
    assert_eq!(running.len(), 2);

    manager.kill("cfme-59").unwrap();

    let pool_dir = dir.path().join("pool");
    assert!(!pool_dir.join("cfme-59.qc2").exists());
    assert!(pool_dir.join("cfme-60.qc2").is_file());
    assert!(pool_dir.join("cfme-60-db.qc2").is_file());

    let remaining = manager.appliances(None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "cfme-60");
}
