//! Error types for the hypervisor access layer.

use thiserror::Error;

/// Errors that can occur during pool, volume and domain operations.
#[derive(Error, Debug)]
pub enum HypervisorError {
    /// Failed to connect to the hypervisor.
    #[error("Failed to connect to hypervisor: {0}")]
    ConnectionFailed(String),

    /// Base image was not found in local image storage.
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    /// Failed to copy the base image into the storage directory.
    #[error("Failed to stage base image: {0}")]
    StageFailed(String),

    /// Storage pool operation failed.
    #[error("Storage pool operation failed: {0}")]
    PoolFailed(String),

    /// The pool rejected the volume descriptor.
    #[error("Failed to create volume: {0}")]
    VolumeCreateFailed(String),

    /// Failed to define a domain.
    #[error("Failed to define domain: {0}")]
    DefineFailed(String),

    /// Failed to start a domain.
    #[error("Failed to start appliance: {0}")]
    StartFailed(String),

    /// Operation not valid for the appliance's current state.
    #[error("Invalid appliance state: {0}")]
    InvalidState(String),

    /// Appliance did not reach the inactive state within the bounded wait.
    #[error("Appliance {0} still active after {1}s, not deleting disks")]
    ShutdownTimeout(String, u64),

    /// Lookup by name or id found nothing.
    #[error("Appliance not found: {0}")]
    NotFound(String),

    /// Domain XML could not be parsed.
    #[error("XML error: {0}")]
    XmlError(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for hypervisor operations.
pub type Result<T> = std::result::Result<T, HypervisorError>;
