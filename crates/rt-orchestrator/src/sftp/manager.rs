//! File transfer session manager

use std::path::Path;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use rt_core::config::TransportConfig;
use rt_core::traits::{ChallengeResponder, SinkHandle};
use rt_core::{ConnectOptions, SessionError, SessionId, TransferStatus};

use super::entry::{join_remote, parse_mode, sort_entries, EntryKind, RemoteEntry};
use super::remote::{FileTransport, RemoteFs};
use super::ssh::SftpTransport;
use crate::publisher::EventPublisher;
use crate::transport::SecretResponder;

/// A connected file session
struct TransferSession {
    target: String,
    fs: Box<dyn RemoteFs>,
    publisher: EventPublisher,
}

enum Slot {
    Connecting(Arc<CancellationToken>),
    Connected(Arc<TransferSession>),
}

type Slots = DashMap<SessionId, Slot>;

/// Removes a `Connecting` slot if this attempt never resolved
struct PendingSlot<'a> {
    sessions: &'a Slots,
    id: SessionId,
    token: Arc<CancellationToken>,
    publisher: EventPublisher,
    resolved: bool,
}

impl PendingSlot<'_> {
    fn release(&self) {
        self.sessions.remove_if(&self.id, |_, slot| {
            matches!(slot, Slot::Connecting(current) if Arc::ptr_eq(current, &self.token))
        });
    }

    fn resolve(&mut self, status: TransferStatus) {
        self.resolved = true;
        self.publisher.transfer_status(status);
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.release();
        if !self.resolved {
            tracing::debug!("Transfer connect for {} abandoned", self.id);
            self.publisher.transfer_status(TransferStatus::Disconnected);
        }
    }
}

/// Manages SFTP sessions keyed by session id
pub struct FileTransferManager {
    transport: Arc<dyn FileTransport>,
    responder: Arc<dyn ChallengeResponder>,
    sessions: Slots,
}

impl FileTransferManager {
    /// Create a manager speaking SFTP with the given transport policy
    pub fn new(config: &TransportConfig) -> Self {
        Self::with_transport(Arc::new(SftpTransport::new(config)))
    }

    /// Create a manager over any file transport
    pub fn with_transport(transport: Arc<dyn FileTransport>) -> Self {
        Self {
            transport,
            responder: Arc::new(SecretResponder),
            sessions: DashMap::new(),
        }
    }

    /// Replace the challenge responder
    pub fn with_responder(mut self, responder: Arc<dyn ChallengeResponder>) -> Self {
        self.responder = responder;
        self
    }

    /// Open a file session; false if the id is taken or connecting failed.
    ///
    /// Dropping the returned future abandons the attempt and frees the id.
    pub async fn connect(&self, options: ConnectOptions, sink: SinkHandle) -> bool {
        let token = Arc::new(CancellationToken::new());
        match self.sessions.entry(options.id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!("Transfer session {} already exists", options.id);
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(Slot::Connecting(Arc::clone(&token)));
            }
        }

        let publisher = EventPublisher::new(options.id.clone(), sink);
        let mut pending = PendingSlot {
            sessions: &self.sessions,
            id: options.id.clone(),
            token: Arc::clone(&token),
            publisher: publisher.clone(),
            resolved: false,
        };
        publisher.transfer_status(TransferStatus::Connecting);

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.transport.open(&options, self.responder.as_ref()) => Some(result),
        };

        match result {
            Some(Ok(fs)) => {
                let session = Arc::new(TransferSession {
                    target: options.target(),
                    fs,
                    publisher: publisher.clone(),
                });

                let installed = match self.sessions.get_mut(&options.id) {
                    Some(mut slot) => match &*slot {
                        Slot::Connecting(current) if Arc::ptr_eq(current, &token) => {
                            *slot = Slot::Connected(Arc::clone(&session));
                            true
                        }
                        _ => false,
                    },
                    None => false,
                };

                if installed {
                    tracing::info!("SFTP session {} connected to {}", options.id, session.target);
                    pending.resolve(TransferStatus::Connected);
                    true
                } else {
                    session.fs.close().await;
                    pending.resolve(TransferStatus::Disconnected);
                    false
                }
            }
            Some(Err(e)) => {
                pending.release();
                tracing::warn!("SFTP session {} failed: {}", options.id, e);
                publisher.error(e.to_string());
                pending.resolve(TransferStatus::Error);
                false
            }
            None => {
                pending.resolve(TransferStatus::Disconnected);
                false
            }
        }
    }

    /// Close a session; false if the id is unknown
    pub async fn disconnect(&self, id: &SessionId) -> bool {
        match self.sessions.remove(id) {
            None => {
                tracing::warn!("Disconnect of unknown transfer session {}", id);
                false
            }
            Some((_, Slot::Connecting(token))) => {
                token.cancel();
                true
            }
            Some((_, Slot::Connected(session))) => {
                session.fs.close().await;
                session
                    .publisher
                    .transfer_status(TransferStatus::Disconnected);
                true
            }
        }
    }

    /// Close every session, returning how many were closed
    pub async fn disconnect_all(&self) -> usize {
        let ids: Vec<SessionId> = self.sessions.iter().map(|r| r.key().clone()).collect();
        join_all(ids.iter().map(|id| self.disconnect(id)))
            .await
            .into_iter()
            .filter(|closed| *closed)
            .count()
    }

    /// Current status of a session
    pub fn status(&self, id: &SessionId) -> Option<TransferStatus> {
        self.sessions.get(id).map(|slot| match &*slot {
            Slot::Connecting(_) => TransferStatus::Connecting,
            Slot::Connected(_) => TransferStatus::Connected,
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session(&self, id: &SessionId) -> Result<Arc<TransferSession>, SessionError> {
        match self.sessions.get(id).as_deref() {
            Some(Slot::Connected(session)) => Ok(Arc::clone(session)),
            Some(Slot::Connecting(_)) => Err(SessionError::NotReady(id.clone())),
            None => Err(SessionError::NotFound(id.clone())),
        }
    }

    /// List a directory, directories first
    pub async fn list(&self, id: &SessionId, dir: &str) -> Result<Vec<RemoteEntry>, SessionError> {
        let session = self.session(id)?;
        let mut entries: Vec<RemoteEntry> = session
            .fs
            .read_dir(dir)
            .await?
            .into_iter()
            .filter(|item| item.name != "." && item.name != "..")
            .map(|item| RemoteEntry {
                path: join_remote(dir, &item.name),
                name: item.name,
                kind: item.kind,
                size: item.size,
                modified: item.modified,
                mode: item.mode,
            })
            .collect();

        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Create a directory
    pub async fn mkdir(&self, id: &SessionId, path: &str) -> Result<(), SessionError> {
        self.session(id)?.fs.create_dir(path).await
    }

    /// Delete a file, or a directory with everything below it
    pub async fn delete(&self, id: &SessionId, path: &str) -> Result<(), SessionError> {
        let session = self.session(id)?;
        match session.fs.kind_of(path).await? {
            EntryKind::Directory => remove_tree(session.fs.as_ref(), path.to_string()).await,
            _ => session.fs.remove_file(path).await,
        }
    }

    /// Rename or move a remote path
    pub async fn rename(&self, id: &SessionId, from: &str, to: &str) -> Result<(), SessionError> {
        self.session(id)?.fs.rename(from, to).await
    }

    /// Change permissions using an octal mode string such as `755`
    pub async fn chmod(&self, id: &SessionId, path: &str, mode: &str) -> Result<(), SessionError> {
        let mode = parse_mode(mode)?;
        self.session(id)?.fs.set_mode(path, mode).await
    }

    /// Copy a local file to the remote host, returning bytes written
    pub async fn upload(
        &self,
        id: &SessionId,
        local: &Path,
        remote: &str,
    ) -> Result<u64, SessionError> {
        let session = self.session(id)?;
        let mut source = tokio::fs::File::open(local).await?;
        let copied = session.fs.write_file(remote, &mut source).await?;

        tracing::debug!("Uploaded {} bytes to {}:{}", copied, session.target, remote);
        Ok(copied)
    }

    /// Copy a remote file to the local disk, returning bytes read
    pub async fn download(
        &self,
        id: &SessionId,
        remote: &str,
        local: &Path,
    ) -> Result<u64, SessionError> {
        let session = self.session(id)?;
        let mut target = tokio::fs::File::create(local).await?;
        let copied = session.fs.read_file(remote, &mut target).await?;
        target.flush().await?;

        tracing::debug!("Downloaded {} bytes from {}:{}", copied, session.target, remote);
        Ok(copied)
    }

    /// Canonical path of the remote working directory
    pub async fn home(&self, id: &SessionId) -> Result<String, SessionError> {
        self.session(id)?.fs.canonicalize(".").await
    }
}

fn remove_tree(fs: &dyn RemoteFs, path: String) -> BoxFuture<'_, Result<(), SessionError>> {
    async move {
        for item in fs.read_dir(&path).await? {
            if item.name == "." || item.name == ".." {
                continue;
            }
            let child = join_remote(&path, &item.name);
            if item.kind == EntryKind::Directory {
                remove_tree(fs, child).await?;
            } else {
                fs.remove_file(&child).await?;
            }
        }
        fs.remove_dir(&path).await
    }
    .boxed()
}
