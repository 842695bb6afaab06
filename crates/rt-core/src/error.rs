//! Core error types for remotty

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::SessionId;

/// Top-level error type for the remotty ecosystem
#[derive(Error, Debug)]
pub enum RtError {
    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-related errors
///
/// Covers the whole lifetime of a session: registry bookkeeping, the
/// transport handshake, the interactive channel and file transfer.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A session with this id is already registered
    #[error("Session already exists: {0}")]
    DuplicateSession(SessionId),

    /// No session with this id is registered
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// The session exists but its shell channel is not open yet
    #[error("Shell for {0} is not ready")]
    NotReady(SessionId),

    /// The remote host could not be reached
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// The transport gave up waiting for the server
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Key exchange did not complete
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Server host key did not match the expected fingerprint
    #[error("Host key verification failed: {0}")]
    HostKeyRejected(String),

    /// Server rejected the supplied credentials
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Private key could not be decoded
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Authenticated, but the interactive channel could not be opened
    #[error("{0}")]
    ChannelCreation(String),

    /// Read or write on an open channel failed
    #[error("Channel I/O error: {0}")]
    ChannelIo(String),

    /// The connection dropped while the shell was open
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The input queue of a session is full
    #[error("Input buffer full for {0}")]
    Backpressure(SessionId),

    /// The session was closed while the operation was in flight
    #[error("Session closed")]
    Closed,

    /// SFTP request failed
    #[error("File transfer error: {0}")]
    Transfer(String),

    /// A permission string was not a valid octal mode
    #[error("Invalid permission mode: {0}")]
    InvalidMode(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the server was reached but refused the credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SessionError::AuthFailed(_) | SessionError::InvalidKey(_))
    }

    /// Whether the failure happened before the server was reached
    pub fn is_unreachable(&self) -> bool {
        matches!(self, SessionError::Connect(_) | SessionError::Timeout(_))
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A host with the same name is already in the host book
    #[error("Host already exists: {0}")]
    DuplicateHost(String),

    /// No host matches the given name or id
    #[error("Unknown host: {0}")]
    UnknownHost(String),
}
