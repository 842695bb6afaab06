//! Orchestrator facade
//!
//! The public entry point: `connect`, `write`, `resize`, `disconnect` and
//! `disconnect_all`. None of them propagate errors; failures are reported
//! through the boolean result, the session's events and `tracing`.
//!
//! Each orchestrator owns its registry. Sessions are independent: the
//! registry is the only state they share and nothing holds a lock across
//! sessions.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;

use rt_core::config::AppConfig;
use rt_core::traits::{ChallengeResponder, SinkHandle, Transport};
use rt_core::{ConnectOptions, SessionError, SessionId, SessionStatus, TerminalSize};

use crate::publisher::EventPublisher;
use crate::registry::{SessionEntry, SessionRegistry};
use crate::session::SessionDriver;
use crate::transport::{SecretResponder, SshTransport};

/// Snapshot of a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub target: String,
    pub status: SessionStatus,
    pub size: TerminalSize,
    /// Creation time (Unix milliseconds)
    pub created_at: u64,
}

impl From<&SessionEntry> for SessionInfo {
    fn from(entry: &SessionEntry) -> Self {
        Self {
            id: entry.id.clone(),
            target: entry.target.clone(),
            status: entry.status(),
            size: entry.size(),
            created_at: entry.created_at,
        }
    }
}

/// Manages concurrent interactive sessions
pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn Transport>,
    responder: Arc<dyn ChallengeResponder>,
    config: AppConfig,
    tracker: TaskTracker,
}

impl Orchestrator {
    /// Create an orchestrator over any transport
    pub fn new(transport: Arc<dyn Transport>, config: AppConfig) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            transport,
            responder: Arc::new(SecretResponder),
            config,
            tracker: TaskTracker::new(),
        }
    }

    /// Create an orchestrator speaking SSH
    pub fn ssh(config: AppConfig) -> Self {
        let transport = Arc::new(SshTransport::new(&config.transport));
        Self::new(transport, config)
    }

    /// Replace the challenge responder
    pub fn with_responder(mut self, responder: Arc<dyn ChallengeResponder>) -> Self {
        self.responder = responder;
        self
    }

    /// Connect a new session.
    ///
    /// Resolves `true` once the shell is open. Resolves `false` if the id is
    /// already live or any step fails; in that case cleanup has already run.
    /// Dropping the returned future does not abort the attempt.
    pub async fn connect(&self, options: ConnectOptions, sink: SinkHandle) -> bool {
        if self.tracker.is_closed() {
            tracing::warn!("Refusing connect for {}: shutting down", options.id);
            return false;
        }

        let entry = Arc::new(SessionEntry::new(
            options.id.clone(),
            options.target(),
            options.size,
        ));
        if !self.registry.insert(Arc::clone(&entry)) {
            return false;
        }

        tracing::info!("Connecting session {} to {}", options.id, options.target());

        let (ready_tx, ready_rx) = oneshot::channel();
        let driver = SessionDriver::new(
            Arc::clone(&entry),
            Arc::clone(&self.registry),
            EventPublisher::new(options.id.clone(), sink),
            self.config.transport.term.clone(),
            self.config.input_buffer,
            ready_tx,
        );
        self.tracker.spawn(driver.run(
            Arc::clone(&self.transport),
            Arc::clone(&self.responder),
            options,
        ));

        match ready_rx.await {
            Ok(connected) => connected,
            Err(_) => {
                // The driver died without resolving
                tracing::error!("Session task for {} ended unexpectedly", entry.id);
                entry.detach_channel();
                self.registry.remove_entry(&entry);
                entry.mark_finished();
                false
            }
        }
    }

    /// Send input to a session's shell; false if it has none yet
    pub fn write(&self, id: &SessionId, data: &[u8]) -> bool {
        let Some(entry) = self.registry.get(id) else {
            tracing::warn!("Dropping input: {}", SessionError::NotFound(id.clone()));
            return false;
        };
        let Some(channel) = entry.channel() else {
            tracing::warn!("Dropping input: {}", SessionError::NotReady(id.clone()));
            return false;
        };

        match channel.write(Bytes::copy_from_slice(data)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Write to {} failed: {}", id, e);
                false
            }
        }
    }

    /// Resize a session's pseudo-terminal; false if it has no shell yet
    pub fn resize(&self, id: &SessionId, cols: u16, rows: u16) -> bool {
        let Some(entry) = self.registry.get(id) else {
            tracing::warn!("Ignoring resize: {}", SessionError::NotFound(id.clone()));
            return false;
        };
        let Some(channel) = entry.channel() else {
            tracing::warn!("Ignoring resize: {}", SessionError::NotReady(id.clone()));
            return false;
        };

        let size = TerminalSize::new(cols, rows);
        match channel.resize(size) {
            Ok(()) => {
                entry.set_size(size);
                true
            }
            Err(e) => {
                tracing::warn!("Resize of {} failed: {}", id, e);
                false
            }
        }
    }

    /// End a session and wait until its transport is released.
    ///
    /// Returns `false` if the id is unknown, including when it was already
    /// disconnected.
    pub async fn disconnect(&self, id: &SessionId) -> bool {
        let Some(entry) = self.registry.remove(id) else {
            tracing::warn!("Cannot disconnect: {}", SessionError::NotFound(id.clone()));
            return false;
        };

        tracing::info!("Disconnecting session {}", id);
        entry.detach_channel();
        entry.cancel();
        entry.finished().await;
        true
    }

    /// Disconnect every live session, returning how many were disconnected
    pub async fn disconnect_all(&self) -> usize {
        let ids = self.registry.ids();
        if !ids.is_empty() {
            tracing::info!("Disconnecting {} sessions", ids.len());
        }
        join_all(ids.iter().map(|id| self.disconnect(id)))
            .await
            .into_iter()
            .filter(|closed| *closed)
            .count()
    }

    /// Disconnect everything and wait for every session task to finish.
    /// Later connects are refused.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.disconnect_all().await;
        self.tracker.wait().await;
    }

    /// Status of a live session
    pub fn status(&self, id: &SessionId) -> Option<SessionStatus> {
        self.registry.get(id).map(|entry| entry.status())
    }

    /// Snapshot of all live sessions, ordered by creation time
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .registry
            .list()
            .iter()
            .map(|entry| SessionInfo::from(entry.as_ref()))
            .collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        sessions
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
