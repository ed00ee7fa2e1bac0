//! SSH implementation of [`ShellTransport`] backed by libssh2.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use ssh2::{Channel, Session};
use tracing::debug;

use crate::error::{ConsoleError, Result};
use crate::transport::{ConnectError, Credentials, RecvOutcome, ShellTransport};

/// Interactive shell over SSH.
///
/// The session and channel are established lazily through
/// [`ShellTransport::connect`] and [`ShellTransport::open_channel`] so the
/// driver's retry loop controls when network traffic happens.
pub struct Ssh2Transport {
    host: String,
    port: u16,
    credentials: Credentials,
    session: Option<Session>,
    channel: Option<Channel>,
}

impl Ssh2Transport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            credentials: Credentials::default(),
            session: None,
            channel: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    fn channel_mut(&mut self) -> Result<&mut Channel> {
        self.channel
            .as_mut()
            .ok_or_else(|| ConsoleError::ChannelFailed("Channel not open".to_string()))
    }
}

impl ShellTransport for Ssh2Transport {
    fn connect(&mut self) -> std::result::Result<(), ConnectError> {
        if self.session.is_some() {
            return Ok(());
        }

        let address = format!("{}:{}", self.host, self.port);
        let tcp = TcpStream::connect(&address)
            .map_err(|e| ConnectError::Refused(format!("{address}: {e}")))?;

        let mut session =
            Session::new().map_err(|e| ConnectError::Refused(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| ConnectError::Refused(format!("{address}: {e}")))?;
        session
            .userauth_password(&self.credentials.username, &self.credentials.password)
            .map_err(|e| ConnectError::Auth(format!("{}: {e}", self.credentials.username)))?;

        debug!(address, user = %self.credentials.username, "SSH session established");
        self.session = Some(session);
        Ok(())
    }

    fn open_channel(&mut self) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ConsoleError::ChannelFailed("Not connected".to_string()))?;

        let mut channel = session
            .channel_session()
            .map_err(|e| ConsoleError::ChannelFailed(e.to_string()))?;
        channel
            .request_pty("xterm", None, None)
            .map_err(|e| ConsoleError::ChannelFailed(e.to_string()))?;
        channel
            .shell()
            .map_err(|e| ConsoleError::ChannelFailed(e.to_string()))?;

        debug!(host = %self.host, "Shell channel opened");
        self.channel = Some(channel);
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        if let Some(session) = &self.session {
            session.set_timeout(timeout.as_millis() as u32);
        }
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        let channel = self.channel_mut()?;
        channel
            .write_all(line.as_bytes())
            .and_then(|_| channel.write_all(b"\n"))
            .and_then(|_| channel.flush())
            .map_err(|e| ConsoleError::SendFailed(e.to_string()))
    }

    fn recv_byte(&mut self) -> Result<RecvOutcome> {
        let channel = self.channel_mut()?;
        let mut byte = [0u8; 1];
        match channel.read(&mut byte) {
            Ok(0) => Ok(RecvOutcome::Closed),
            Ok(_) => Ok(RecvOutcome::Byte(byte[0])),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(RecvOutcome::Timeout)
            }
            Err(e) => Err(ConsoleError::RecvFailed(e.to_string())),
        }
    }
}
