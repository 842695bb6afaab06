//! SFTP over an SSH connection

use std::fmt::Display;

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use rt_core::config::TransportConfig;
use rt_core::traits::{ChallengeResponder, Connection};
use rt_core::{ConnectOptions, SessionError};

use super::entry::EntryKind;
use super::remote::{DirItem, FileTransport, RemoteFs};
use crate::transport::{SshConnection, SshTransport};

fn transfer_error(e: impl Display) -> SessionError {
    SessionError::Transfer(e.to_string())
}

/// Opens SFTP sessions, each on its own SSH connection
pub struct SftpTransport {
    ssh: SshTransport,
}

impl SftpTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            ssh: SshTransport::new(config),
        }
    }

    async fn start(
        connection: &mut SshConnection,
        options: &ConnectOptions,
        responder: &dyn ChallengeResponder,
    ) -> Result<SftpSession, SessionError> {
        connection.handshake().await?;
        connection
            .authenticate(&options.username, &options.auth, responder)
            .await?;
        connection.open_sftp().await
    }
}

#[async_trait]
impl FileTransport for SftpTransport {
    async fn open(
        &self,
        options: &ConnectOptions,
        responder: &dyn ChallengeResponder,
    ) -> Result<Box<dyn RemoteFs>, SessionError> {
        let mut connection = self.ssh.establish(options).await?;
        match Self::start(&mut connection, options, responder).await {
            Ok(sftp) => Ok(Box::new(SshFs {
                sftp,
                connection: Mutex::new(connection),
            })),
            Err(e) => {
                connection.close().await;
                Err(e)
            }
        }
    }
}

/// An SFTP session and the connection it runs on
struct SshFs {
    sftp: SftpSession,
    connection: Mutex<SshConnection>,
}

fn kind_of(is_dir: bool, is_symlink: bool) -> EntryKind {
    if is_dir {
        EntryKind::Directory
    } else if is_symlink {
        EntryKind::Symlink
    } else {
        EntryKind::File
    }
}

#[async_trait]
impl RemoteFs for SshFs {
    async fn read_dir(&self, path: &str) -> Result<Vec<DirItem>, SessionError> {
        let items = self.sftp.read_dir(path).await.map_err(transfer_error)?;
        Ok(items
            .map(|item| {
                let file_type = item.file_type();
                let attrs = item.metadata();
                DirItem {
                    name: item.file_name(),
                    kind: kind_of(file_type.is_dir(), file_type.is_symlink()),
                    size: attrs.size.unwrap_or(0),
                    modified: attrs.mtime.map(u64::from),
                    mode: attrs.permissions.unwrap_or(0) & 0o7777,
                }
            })
            .collect())
    }

    async fn kind_of(&self, path: &str) -> Result<EntryKind, SessionError> {
        let attrs = self
            .sftp
            .symlink_metadata(path)
            .await
            .map_err(transfer_error)?;
        Ok(kind_of(attrs.is_dir(), attrs.is_symlink()))
    }

    async fn create_dir(&self, path: &str) -> Result<(), SessionError> {
        self.sftp.create_dir(path).await.map_err(transfer_error)
    }

    async fn remove_file(&self, path: &str) -> Result<(), SessionError> {
        self.sftp.remove_file(path).await.map_err(transfer_error)
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SessionError> {
        self.sftp.remove_dir(path).await.map_err(transfer_error)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SessionError> {
        self.sftp.rename(from, to).await.map_err(transfer_error)
    }

    async fn set_mode(&self, path: &str, mode: u32) -> Result<(), SessionError> {
        let mut attrs = FileAttributes::empty();
        attrs.permissions = Some(mode);
        self.sftp
            .set_metadata(path, attrs)
            .await
            .map_err(transfer_error)
    }

    async fn write_file(
        &self,
        path: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, SessionError> {
        let mut target = self.sftp.create(path).await.map_err(transfer_error)?;
        let copied = tokio::io::copy(source, &mut target)
            .await
            .map_err(transfer_error)?;
        target.shutdown().await.map_err(transfer_error)?;
        Ok(copied)
    }

    async fn read_file(
        &self,
        path: &str,
        target: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, SessionError> {
        let mut source = self.sftp.open(path).await.map_err(transfer_error)?;
        Ok(tokio::io::copy(&mut source, target).await?)
    }

    async fn canonicalize(&self, path: &str) -> Result<String, SessionError> {
        self.sftp.canonicalize(path).await.map_err(transfer_error)
    }

    async fn close(&self) {
        if let Err(e) = self.sftp.close().await {
            tracing::debug!("SFTP close failed: {}", e);
        }
        self.connection.lock().await.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_wins_over_symlink() {
        assert_eq!(kind_of(true, false), EntryKind::Directory);
        assert_eq!(kind_of(false, true), EntryKind::Symlink);
        assert_eq!(kind_of(false, false), EntryKind::File);
    }
}
