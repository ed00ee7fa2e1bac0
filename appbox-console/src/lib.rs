//! # appbox Console
//!
//! Scripted driving of the appliance's SSH text console.
//!
//! Fresh appliances are configured through a line-oriented menu on their
//! serial/SSH console, not through an API. This crate replays keystroke
//! scripts against that menu: [`VersionPolicy`] selects the right token
//! sequence for the appliance's release, and [`ConsoleDriver`] sends the
//! tokens and collects each rendered screen. Transport is abstracted behind
//! [`ShellTransport`]; the real SSH implementation lives behind the `ssh`
//! feature so the crate builds without libssh2.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use appbox_console::{ConsoleDriver, Ssh2Transport, VersionPolicy};
//!
//! let mut driver = ConsoleDriver::new(Ssh2Transport::new("192.168.122.101"));
//! let policy = VersionPolicy::new();
//! driver.configure_database(&policy, "5.11.0.1")?;
//! driver.restart_server(&policy, "5.11.0.1")?;
//! ```

pub mod driver;
pub mod error;
pub mod script;
pub mod transport;

pub use driver::{ConsoleDriver, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
pub use error::{ConsoleError, Result};
pub use script::{Keystroke, Purpose, ScriptedSequence, Version, VersionPolicy};
pub use transport::{Credentials, RecvOutcome, ShellTransport};

// Re-export the SSH transport when compiled in
#[cfg(feature = "ssh")]
pub mod ssh;
#[cfg(feature = "ssh")]
pub use ssh::Ssh2Transport;
