//! Transport capability traits
//!
//! The orchestrator drives a connection through these steps in order:
//! [`Transport::connect`], [`Connection::handshake`],
//! [`Connection::authenticate`], [`Connection::open_shell`]. The secure
//! handshake itself lives behind the trait.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use super::responder::ChallengeResponder;
use crate::error::SessionError;
use crate::types::{AuthMethod, ConnectOptions, TerminalSize};

/// Server identity learned during key exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// Host key algorithm, e.g. `ssh-ed25519`
    pub algorithm: String,
    /// SHA-256 fingerprint of the host key
    pub fingerprint: String,
}

impl fmt::Display for HandshakeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} SHA256:{}", self.algorithm, self.fingerprint)
    }
}

/// Something that can reach a remote host
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the network connection to `options.host:options.port`
    ///
    /// Bounded by the transport's own connect timeout.
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, SessionError>;
}

/// An established, not yet authenticated, connection
#[async_trait]
pub trait Connection: Send {
    /// Wait until the server has presented its host key
    async fn handshake(&mut self) -> Result<HandshakeInfo, SessionError>;

    /// Authenticate as `username`
    ///
    /// Server challenges are answered through `responder`.
    async fn authenticate(
        &mut self,
        username: &str,
        auth: &AuthMethod,
        responder: &dyn ChallengeResponder,
    ) -> Result<(), SessionError>;

    /// Open an interactive shell with a pseudo-terminal
    async fn open_shell(
        &mut self,
        term: &str,
        size: TerminalSize,
    ) -> Result<Box<dyn ShellChannel>, SessionError>;

    /// End the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Something that happened on an open shell channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Primary output
    Data(Bytes),
    /// Diagnostic output
    Stderr(Bytes),
    /// The remote process exited with a status code
    ExitStatus(u32),
    /// The remote process was killed by a signal
    ExitSignal(String),
    /// The remote side will send no more data
    Eof,
}

/// An open interactive channel
#[async_trait]
pub trait ShellChannel: Send {
    /// Next event
    ///
    /// `Ok(None)` once the remote side closed the channel. An error means
    /// the connection underneath was lost. Must be cancellation safe.
    async fn recv(&mut self) -> Result<Option<ChannelEvent>, SessionError>;

    /// Send input to the remote shell
    async fn write(&mut self, data: &[u8]) -> Result<(), SessionError>;

    /// Change the remote pseudo-terminal size
    async fn resize(&mut self, size: TerminalSize) -> Result<(), SessionError>;

    /// Close the channel
    async fn close(&mut self);
}
