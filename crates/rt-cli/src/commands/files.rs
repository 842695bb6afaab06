//! File commands over SFTP
//!
//! Each command opens one transfer session to a saved host, runs a single
//! operation and disconnects.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use rt_core::config::{AppConfig, HostBook};
use rt_core::events::{EventPayload, SessionEvent};
use rt_core::traits::SinkHandle;
use rt_core::{SessionId, TerminalSize};
use rt_orchestrator::sftp::join_remote;
use rt_orchestrator::FileTransferManager;

use crate::output::{format_bytes, format_entries, print_success};

struct FileSession {
    manager: FileTransferManager,
    id: SessionId,
    _sink: Arc<mpsc::UnboundedSender<SessionEvent>>,
}

impl FileSession {
    async fn open(config: &AppConfig, hosts: &Path, host: &str) -> Result<Self> {
        let book = HostBook::load_or_default(hosts)
            .with_context(|| format!("Failed to load hosts from {:?}", hosts))?;
        let profile = book.require(host)?;

        let id = SessionId::from(format!("{}-files", profile.name));
        let options = profile.connect_options(id.clone(), TerminalSize::default());
        let target = options.target();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = Arc::new(tx);
        let manager = FileTransferManager::new(&config.transport);

        if !manager.connect(options, SinkHandle::new(&sink)).await {
            let mut reason = String::from("unknown error");
            while let Ok(event) = rx.try_recv() {
                if let EventPayload::Error { message } = event.payload {
                    reason = message;
                }
            }
            anyhow::bail!("Failed to open file session to {}: {}", target, reason);
        }

        Ok(Self {
            manager,
            id,
            _sink: sink,
        })
    }

    async fn close(self) {
        self.manager.disconnect(&self.id).await;
    }

    async fn resolve(&self, path: Option<&str>) -> Result<String> {
        match path {
            Some(path) => Ok(path.to_string()),
            None => Ok(self.manager.home(&self.id).await?),
        }
    }
}

fn file_name(path: &str) -> Result<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Cannot derive a file name from {:?}", path))
}

/// List a remote directory (the login directory by default)
pub async fn files_ls(
    config: &AppConfig,
    hosts: &Path,
    host: &str,
    path: Option<&str>,
    json: bool,
) -> Result<()> {
    let session = FileSession::open(config, hosts, host).await?;
    let result = async {
        let dir = session.resolve(path).await?;
        let entries = session.manager.list(&session.id, &dir).await?;
        Ok::<_, anyhow::Error>((dir, entries))
    }
    .await;
    session.close().await;

    let (dir, entries) = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("{}:", dir);
        println!("{}", format_entries(&entries));
    }
    Ok(())
}

/// Create a remote directory
pub async fn files_mkdir(config: &AppConfig, hosts: &Path, host: &str, path: &str) -> Result<()> {
    let session = FileSession::open(config, hosts, host).await?;
    let result = session.manager.mkdir(&session.id, path).await;
    session.close().await;

    result?;
    print_success(&format!("Created {}", path));
    Ok(())
}

/// Delete a remote file or directory tree
pub async fn files_rm(config: &AppConfig, hosts: &Path, host: &str, path: &str) -> Result<()> {
    let session = FileSession::open(config, hosts, host).await?;
    let result = session.manager.delete(&session.id, path).await;
    session.close().await;

    result?;
    print_success(&format!("Deleted {}", path));
    Ok(())
}

/// Rename or move a remote path
pub async fn files_mv(
    config: &AppConfig,
    hosts: &Path,
    host: &str,
    from: &str,
    to: &str,
) -> Result<()> {
    let session = FileSession::open(config, hosts, host).await?;
    let result = session.manager.rename(&session.id, from, to).await;
    session.close().await;

    result?;
    print_success(&format!("Moved {} -> {}", from, to));
    Ok(())
}

/// Change permissions of a remote path (`755`, `0644`, ...)
pub async fn files_chmod(
    config: &AppConfig,
    hosts: &Path,
    host: &str,
    mode: &str,
    path: &str,
) -> Result<()> {
    let session = FileSession::open(config, hosts, host).await?;
    let result = session.manager.chmod(&session.id, path, mode).await;
    session.close().await;

    result?;
    print_success(&format!("Set mode {} on {}", mode, path));
    Ok(())
}

/// Download a remote file
pub async fn files_get(
    config: &AppConfig,
    hosts: &Path,
    host: &str,
    remote: &str,
    local: Option<PathBuf>,
) -> Result<()> {
    let local = match local {
        Some(local) if local.is_dir() => local.join(file_name(remote)?),
        Some(local) => local,
        None => PathBuf::from(file_name(remote)?),
    };

    let session = FileSession::open(config, hosts, host).await?;
    let result = session.manager.download(&session.id, remote, &local).await;
    session.close().await;

    let bytes = result.with_context(|| format!("Failed to download {}", remote))?;
    print_success(&format!(
        "Downloaded {} to {:?} ({})",
        remote,
        local,
        format_bytes(bytes)
    ));
    Ok(())
}

/// Upload a local file
pub async fn files_put(
    config: &AppConfig,
    hosts: &Path,
    host: &str,
    local: &Path,
    remote: Option<&str>,
) -> Result<()> {
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Cannot upload {:?}: not a file path", local))?
        .to_string();

    let session = FileSession::open(config, hosts, host).await?;
    let result = async {
        let remote = match remote {
            Some(remote) if remote.ends_with('/') => join_remote(remote, &name),
            Some(remote) => remote.to_string(),
            None => join_remote(&session.resolve(None).await?, &name),
        };
        let bytes = session.manager.upload(&session.id, local, &remote).await?;
        Ok::<_, anyhow::Error>((remote, bytes))
    }
    .await;
    session.close().await;

    let (remote, bytes) = result.with_context(|| format!("Failed to upload {:?}", local))?;
    print_success(&format!(
        "Uploaded {:?} to {} ({})",
        local,
        remote,
        format_bytes(bytes)
    ));
    Ok(())
}
