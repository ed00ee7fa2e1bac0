//! Remote-shell transport abstraction.
//!
//! [`ShellTransport`] is the seam between the console driver and the wire:
//! the real implementation speaks SSH, tests script a mock. Connection
//! establishment goes through [`connect_with_retry`], a bounded retry loop
//! with backoff and an unambiguous tri-state outcome.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::Result;

/// Fixed login used by every appliance image.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for Credentials {
    /// The credentials appliance images ship with.
    fn default() -> Self {
        Self::new("root", "smartvm")
    }
}

/// One unit read from the response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    Byte(u8),
    /// Nothing arrived within the configured read timeout.
    Timeout,
    /// The remote side closed the channel.
    Closed,
}

/// Why a connect attempt failed, split by whether retrying can help.
#[derive(Debug)]
pub enum ConnectError {
    /// Endpoint unreachable or not ready yet; worth retrying.
    Refused(String),
    /// Credentials rejected; retrying with the same fixed login is futile.
    Auth(String),
}

/// Outcome of [`connect_with_retry`].
#[derive(Debug)]
pub enum ConnectOutcome {
    Connected,
    TimedOut,
    Fatal(ConnectError),
}

/// A synchronous interactive shell.
pub trait ShellTransport {
    /// Establish the session. Called repeatedly by the retry loop until it
    /// succeeds or the deadline passes.
    fn connect(&mut self) -> std::result::Result<(), ConnectError>;

    /// Open the interactive channel on an established session.
    fn open_channel(&mut self) -> Result<()>;

    /// Set the read timeout applied to subsequent [`recv_byte`](Self::recv_byte) calls.
    fn set_timeout(&mut self, timeout: Duration);

    /// Send one command line, terminator included.
    fn send_line(&mut self, line: &str) -> Result<()>;

    /// Read a single byte from the response stream.
    fn recv_byte(&mut self) -> Result<RecvOutcome>;
}

/// Retry `connect` with backoff until it succeeds, fails fatally, or the
/// wall-clock deadline elapses.
pub fn connect_with_retry<T: ShellTransport + ?Sized>(
    transport: &mut T,
    timeout: Duration,
) -> ConnectOutcome {
    let start = Instant::now();
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(5);

    loop {
        match transport.connect() {
            Ok(()) => return ConnectOutcome::Connected,
            Err(err @ ConnectError::Auth(_)) => {
                warn!(error = ?err, "Connect failed fatally");
                return ConnectOutcome::Fatal(err);
            }
            Err(ConnectError::Refused(reason)) => {
                if start.elapsed() >= timeout {
                    return ConnectOutcome::TimedOut;
                }
                debug!(
                    error = %reason,
                    elapsed = ?start.elapsed(),
                    "Connect attempt failed, retrying"
                );
                thread::sleep(backoff);
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyTransport {
        refusals: usize,
        attempts: usize,
        auth_fails: bool,
    }

    impl ShellTransport for FlakyTransport {
        fn connect(&mut self) -> std::result::Result<(), ConnectError> {
            self.attempts += 1;
            if self.auth_fails {
                return Err(ConnectError::Auth("permission denied".to_string()));
            }
            if self.attempts <= self.refusals {
                return Err(ConnectError::Refused("connection refused".to_string()));
            }
            Ok(())
        }

        fn open_channel(&mut self) -> Result<()> {
            Ok(())
        }

        fn set_timeout(&mut self, _timeout: Duration) {}

        fn send_line(&mut self, _line: &str) -> Result<()> {
            Ok(())
        }

        fn recv_byte(&mut self) -> Result<RecvOutcome> {
            Ok(RecvOutcome::Timeout)
        }
    }

    #[test]
    fn retries_until_connected() {
        let mut transport = FlakyTransport {
            refusals: 2,
            attempts: 0,
            auth_fails: false,
        };

        let outcome = connect_with_retry(&mut transport, Duration::from_secs(5));
        assert!(matches!(outcome, ConnectOutcome::Connected));
        assert_eq!(transport.attempts, 3);
    }

    #[test]
    fn auth_failure_is_fatal_without_retry() {
        let mut transport = FlakyTransport {
            refusals: 0,
            attempts: 0,
            auth_fails: true,
        };

        let outcome = connect_with_retry(&mut transport, Duration::from_secs(5));
        assert!(matches!(outcome, ConnectOutcome::Fatal(ConnectError::Auth(_))));
        assert_eq!(transport.attempts, 1);
    }

    #[test]
    fn deadline_bounds_the_retrying() {
        let mut transport = FlakyTransport {
            refusals: usize::MAX,
            attempts: 0,
            auth_fails: false,
        };

        let outcome = connect_with_retry(&mut transport, Duration::from_millis(50));
        assert!(matches!(outcome, ConnectOutcome::TimedOut));
        assert!(transport.attempts >= 1);
    }
}
