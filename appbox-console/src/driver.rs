//! Scripted interaction with the appliance's management console.
//!
//! The console is a line-oriented text menu over SSH. The driver replays a
//! [`ScriptedSequence`] against it: send one token, then read bytes until
//! the menu's ready prompt appears or the read timeout fires. A timeout is
//! treated as end-of-screen, not as an error, because menu steps that spawn
//! background work stop printing without ever showing the prompt.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::{ConsoleError, Result};
use crate::script::{Purpose, ScriptedSequence, VersionPolicy};
use crate::transport::{connect_with_retry, ConnectError, ConnectOutcome, RecvOutcome, ShellTransport};

/// Prompt the appliance menu prints when a screen has fully rendered.
const SENTINEL: &str = "Press any key to continue";

/// Default ceiling for establishing the SSH session.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default per-keystroke read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Replays keystroke scripts against an appliance console.
///
/// The driver opens the transport's shell channel once, on first use, and
/// reuses it for every subsequent keystroke so that menu state carries
/// across calls within one session.
pub struct ConsoleDriver<T: ShellTransport> {
    transport: T,
    connect_timeout: Duration,
    read_timeout: Duration,
    connected: bool,
    channel_open: bool,
}

impl<T: ShellTransport> ConsoleDriver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connected: false,
            channel_open: false,
        }
    }

    /// Ceiling for the connection retry loop.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Read timeout applied to keystrokes that carry no override.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Establish the SSH session, retrying while the appliance boots.
    ///
    /// Appliances accept TCP connections well before sshd is ready, so
    /// refused and dropped connections are retried until
    /// `connect_timeout` elapses. Authentication failures abort
    /// immediately; the credentials are fixed, so retrying cannot help.
    pub fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        match connect_with_retry(&mut self.transport, self.connect_timeout) {
            ConnectOutcome::Connected => {
                self.connected = true;
                Ok(())
            }
            ConnectOutcome::TimedOut => {
                Err(ConsoleError::ConnectTimeout(self.connect_timeout.as_secs()))
            }
            ConnectOutcome::Fatal(ConnectError::Auth(reason)) => {
                Err(ConsoleError::AuthFailed(reason))
            }
            ConnectOutcome::Fatal(ConnectError::Refused(reason)) => {
                Err(ConsoleError::ConnectFailed(reason))
            }
        }
    }

    /// Replay `sequence` and return the screen captured after each token.
    #[instrument(skip(self, sequence), fields(keystrokes = sequence.len()))]
    pub fn run(&mut self, sequence: &ScriptedSequence) -> Result<Vec<String>> {
        self.connect()?;
        self.ensure_channel()?;

        let mut screens = Vec::with_capacity(sequence.len());
        for keystroke in sequence.iter() {
            let timeout = keystroke.timeout.unwrap_or(self.read_timeout);
            self.transport.set_timeout(timeout);

            debug!(token = keystroke.token(), ?timeout, "Sending keystroke");
            self.transport.send_line(keystroke.token())?;
            screens.push(self.read_screen()?);
        }

        info!(keystrokes = sequence.len(), "Script complete");
        Ok(screens)
    }

    /// Walk the database setup menu for an appliance at `version`.
    pub fn configure_database(&mut self, policy: &VersionPolicy, version: &str) -> Result<Vec<String>> {
        info!(version, "Configuring internal database");
        self.run(&policy.sequence_for(Purpose::ConfigureDatabase, version))
    }

    /// Restart the server process through the menu.
    pub fn restart_server(&mut self, policy: &VersionPolicy, version: &str) -> Result<Vec<String>> {
        info!(version, "Restarting appliance server");
        self.run(&policy.sequence_for(Purpose::RestartServer, version))
    }

    fn ensure_channel(&mut self) -> Result<()> {
        if self.channel_open {
            return Ok(());
        }
        self.transport.open_channel()?;
        self.channel_open = true;
        Ok(())
    }

    /// Read until the menu prompt or the transport's read timeout.
    fn read_screen(&mut self) -> Result<String> {
        let mut buffer = Vec::new();
        loop {
            match self.transport.recv_byte()? {
                RecvOutcome::Byte(byte) => {
                    buffer.push(byte);
                    if buffer.ends_with(SENTINEL.as_bytes()) {
                        break;
                    }
                }
                RecvOutcome::Timeout => {
                    debug!(bytes = buffer.len(), "Read timed out, treating screen as complete");
                    break;
                }
                RecvOutcome::Closed => {
                    warn!(bytes = buffer.len(), "Console channel closed mid-screen");
                    break;
                }
            }
        }
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use crate::script::{PERSIST_TIMEOUT, PERSIST_TOKEN};

    /// Transport that serves canned screens and records everything sent.
    struct ScriptedShell {
        screens: VecDeque<Vec<u8>>,
        pending: VecDeque<u8>,
        sent: Vec<String>,
        timeouts: Vec<Duration>,
        connects: usize,
        channel_opens: usize,
    }

    impl ScriptedShell {
        fn new(screens: &[&str]) -> Self {
            Self {
                screens: screens.iter().map(|s| s.as_bytes().to_vec()).collect(),
                pending: VecDeque::new(),
                sent: Vec::new(),
                timeouts: Vec::new(),
                connects: 0,
                channel_opens: 0,
            }
        }
    }

    impl ShellTransport for ScriptedShell {
        fn connect(&mut self) -> std::result::Result<(), ConnectError> {
            self.connects += 1;
            Ok(())
        }

        fn open_channel(&mut self) -> Result<()> {
            self.channel_opens += 1;
            Ok(())
        }

        fn set_timeout(&mut self, timeout: Duration) {
            self.timeouts.push(timeout);
        }

        fn send_line(&mut self, line: &str) -> Result<()> {
            self.sent.push(line.to_string());
            if let Some(screen) = self.screens.pop_front() {
                self.pending = screen.into();
            }
            Ok(())
        }

        fn recv_byte(&mut self) -> Result<RecvOutcome> {
            match self.pending.pop_front() {
                Some(byte) => Ok(RecvOutcome::Byte(byte)),
                None => Ok(RecvOutcome::Timeout),
            }
        }
    }

    #[test]
    fn run_replays_tokens_and_captures_screens() {
        let shell = ScriptedShell::new(&[
            "Welcome\nPress any key to continue",
            "Main menu\nPress any key to continue",
        ]);
        let mut driver = ConsoleDriver::new(shell);

        let screens = driver.run(&ScriptedSequence::from_tokens(&["ap", ""])).unwrap();

        assert_eq!(screens.len(), 2);
        assert!(screens[0].starts_with("Welcome"));
        assert!(screens[1].starts_with("Main menu"));
        assert_eq!(driver.transport.sent, vec!["ap", ""]);
    }

    #[test]
    fn prompt_terminates_the_read_early() {
        // Bytes after the prompt stay queued for the next screen.
        let shell = ScriptedShell::new(&["menu text Press any key to continueLEFTOVER"]);
        let mut driver = ConsoleDriver::new(shell);

        let screens = driver.run(&ScriptedSequence::from_tokens(&["ap"])).unwrap();

        assert!(screens[0].ends_with(SENTINEL));
        assert_eq!(driver.transport.pending.len(), "LEFTOVER".len());
    }

    #[test]
    fn timeout_is_treated_as_screen_completion() {
        let shell = ScriptedShell::new(&["output with no prompt"]);
        let mut driver = ConsoleDriver::new(shell);

        let screens = driver.run(&ScriptedSequence::from_tokens(&["15"])).unwrap();

        assert_eq!(screens[0], "output with no prompt");
    }

    #[test]
    fn channel_is_opened_once_across_runs() {
        let shell = ScriptedShell::new(&["Press any key to continue", "Press any key to continue"]);
        let mut driver = ConsoleDriver::new(shell);

        driver.run(&ScriptedSequence::from_tokens(&["ap"])).unwrap();
        driver.run(&ScriptedSequence::from_tokens(&["ap"])).unwrap();

        assert_eq!(driver.transport.connects, 1);
        assert_eq!(driver.transport.channel_opens, 1);
    }

    #[test]
    fn persist_token_gets_the_extended_timeout() {
        let shell = ScriptedShell::new(&["Press any key to continue", "done"]);
        let mut driver = ConsoleDriver::new(shell).with_read_timeout(Duration::from_secs(3));

        driver
            .run(&ScriptedSequence::from_tokens(&["ap", PERSIST_TOKEN]))
            .unwrap();

        assert_eq!(
            driver.transport.timeouts,
            vec![Duration::from_secs(3), PERSIST_TIMEOUT]
        );
    }

    #[test]
    fn configure_database_follows_the_version_policy() {
        let shell = ScriptedShell::new(&[]);
        let mut driver = ConsoleDriver::new(shell);
        let policy = VersionPolicy::new();

        driver.configure_database(&policy, "5.11.0.1").unwrap();

        assert_eq!(driver.transport.sent[2], "7");
        assert_eq!(driver.transport.sent.last().map(String::as_str), Some("w"));
    }
}
