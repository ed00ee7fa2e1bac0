//! Libvirt hypervisor backend.
//!
//! The primary backend, talking to libvirt/QEMU. Requires the `libvirt`
//! feature and a system with libvirt installed.

#[cfg(feature = "libvirt")]
mod backend;

#[cfg(feature = "libvirt")]
pub use backend::LibvirtConnection;

/// Check whether the libvirt backend is compiled in.
pub fn is_available() -> bool {
    cfg!(feature = "libvirt")
}
