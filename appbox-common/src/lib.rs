//! # appbox Common
//!
//! Shared utilities for the appbox components.
//!
//! ## Logging
//!
//! ```no_run
//! appbox_common::init_logging("info").unwrap();
//! ```

pub mod logging;

pub use logging::init_logging;
