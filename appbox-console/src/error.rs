//! Error types for console automation.

use thiserror::Error;

/// Errors from the console layer.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// Could not reach the remote shell endpoint.
    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    /// The endpoint rejected the fixed credentials; retrying cannot help.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// No connection within the wall-clock deadline.
    #[error("No connection within {0}s")]
    ConnectTimeout(u64),

    /// Could not open the interactive channel.
    #[error("Failed to open channel: {0}")]
    ChannelFailed(String),

    /// Sending a keystroke failed.
    #[error("Failed to send: {0}")]
    SendFailed(String),

    /// Reading the response stream failed.
    #[error("Failed to read: {0}")]
    RecvFailed(String),
}

/// Result type for console operations.
pub type Result<T> = std::result::Result<T, ConsoleError>;
