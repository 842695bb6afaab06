//! Remote file system seam
//!
//! [`FileTransport`] opens an authenticated file session; [`RemoteFs`] is
//! the handful of requests the manager builds its operations from.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use rt_core::traits::ChallengeResponder;
use rt_core::{ConnectOptions, SessionError};

use super::entry::EntryKind;

/// One raw directory item, `.` and `..` included if the server sends them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirItem {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Modification time (Unix seconds)
    pub modified: Option<u64>,
    /// Permission bits without the file type
    pub mode: u32,
}

/// Something that can open file sessions on a remote host
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Connect, authenticate and start the file subsystem
    ///
    /// On error nothing is left open.
    async fn open(
        &self,
        options: &ConnectOptions,
        responder: &dyn ChallengeResponder,
    ) -> Result<Box<dyn RemoteFs>, SessionError>;
}

/// An open remote file session
#[async_trait]
pub trait RemoteFs: Send + Sync {
    async fn read_dir(&self, path: &str) -> Result<Vec<DirItem>, SessionError>;

    /// Kind of `path` itself, not following a final symlink
    async fn kind_of(&self, path: &str) -> Result<EntryKind, SessionError>;

    async fn create_dir(&self, path: &str) -> Result<(), SessionError>;

    async fn remove_file(&self, path: &str) -> Result<(), SessionError>;

    /// Remove an empty directory
    async fn remove_dir(&self, path: &str) -> Result<(), SessionError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), SessionError>;

    async fn set_mode(&self, path: &str, mode: u32) -> Result<(), SessionError>;

    /// Create or truncate `path` and fill it from `source`
    async fn write_file(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, SessionError>;

    /// Stream `path` into `target`
    async fn read_file(
        &self,
        path: &str,
        target: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, SessionError>;

    async fn canonicalize(&self, path: &str) -> Result<String, SessionError>;

    /// End the file session and its connection
    async fn close(&self);
}
