//! Session registry
//!
//! The registry is the single source of truth for which sessions exist.
//! Inserting is check-then-set under the map's shard lock, so two connects
//! racing on the same id cannot both win.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rt_core::time::current_time_millis;
use rt_core::{SessionError, SessionId, SessionStatus, TerminalSize};
use tokio_util::sync::CancellationToken;

use crate::bridge::ChannelHandle;

/// Live state of one session
pub struct SessionEntry {
    /// Session ID
    pub id: SessionId,
    /// `host:port` the session connects to
    pub target: String,
    /// Creation time (Unix milliseconds)
    pub created_at: u64,
    status: RwLock<SessionStatus>,
    size: RwLock<TerminalSize>,
    channel: RwLock<Option<ChannelHandle>>,
    /// Cancelled to request teardown
    cancel: CancellationToken,
    /// Cancelled by the driver once teardown has finished
    finished: CancellationToken,
}

impl SessionEntry {
    /// Create an entry in the `idle` state
    pub fn new(id: SessionId, target: impl Into<String>, size: TerminalSize) -> Self {
        Self {
            id,
            target: target.into(),
            created_at: current_time_millis(),
            status: RwLock::new(SessionStatus::Idle),
            size: RwLock::new(size),
            channel: RwLock::new(None),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Last known terminal size
    pub fn size(&self) -> TerminalSize {
        *self.size.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_size(&self, size: TerminalSize) {
        *self.size.write().unwrap_or_else(PoisonError::into_inner) = size;
    }

    /// The shell channel, present only while the session is ready
    pub fn channel(&self) -> Option<ChannelHandle> {
        self.channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attach the shell channel. Refused unless the session is `ready` and
    /// teardown has not been requested.
    pub(crate) fn attach_channel(&self, handle: ChannelHandle) -> bool {
        let mut slot = self.channel.write().unwrap_or_else(PoisonError::into_inner);
        if self.cancel.is_cancelled() || self.status() != SessionStatus::Ready {
            return false;
        }
        *slot = Some(handle);
        true
    }

    /// Detach the shell channel; later writes and resizes fail
    pub(crate) fn detach_channel(&self) -> Option<ChannelHandle> {
        self.channel
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Run `f` only while the channel is attached.
    ///
    /// Detaching waits for a running `f` to return, so once
    /// [`detach_channel`](Self::detach_channel) returns no further `f` runs.
    pub(crate) fn while_attached<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let slot = self.channel.read().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(|_| f())
    }

    /// Request teardown
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.cancel();
    }

    /// Wait until the session's transport has been released
    pub async fn finished(&self) {
        self.finished.cancelled().await
    }
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("status", &self.status())
            .field("size", &self.size())
            .finish()
    }
}

/// All live sessions, indexed by id
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionEntry>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Insert a session unless its id is taken
    pub fn insert(&self, entry: Arc<SessionEntry>) -> bool {
        match self.sessions.entry(entry.id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!("{}", SessionError::DuplicateSession(entry.id.clone()));
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    /// Get a session by ID
    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.get(id).map(|r| Arc::clone(&r))
    }

    /// Remove a session by ID; no-op when absent
    pub fn remove(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.remove(id).map(|(_, entry)| entry)
    }

    /// Remove exactly this entry.
    ///
    /// A newer session registered under the same id is left alone.
    pub fn remove_entry(&self, entry: &Arc<SessionEntry>) -> bool {
        self.sessions
            .remove_if(&entry.id, |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// IDs of all sessions
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    /// List all sessions
    pub fn list(&self) -> Vec<Arc<SessionEntry>> {
        self.sessions.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> Arc<SessionEntry> {
        Arc::new(SessionEntry::new(
            SessionId::new(id),
            "10.0.0.5:22",
            TerminalSize::default(),
        ))
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let registry = SessionRegistry::new();
        let first = entry("s1");
        assert!(registry.insert(first.clone()));
        assert!(!registry.insert(entry("s1")));

        assert_eq!(registry.len(), 1);
        let stored = registry.get(&SessionId::new("s1")).unwrap();
        assert!(Arc::ptr_eq(&stored, &first));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.insert(entry("s1"));

        assert!(registry.remove(&SessionId::new("s1")).is_some());
        assert!(registry.remove(&SessionId::new("s1")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_entry_ignores_newer_session() {
        let registry = SessionRegistry::new();
        let old = entry("s1");
        registry.insert(old.clone());
        registry.remove(&old.id);

        let new = entry("s1");
        registry.insert(new.clone());

        assert!(!registry.remove_entry(&old));
        assert!(registry.contains(&new.id));
        assert!(registry.remove_entry(&new));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_have_one_winner() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.insert(entry("same")))
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_attach_requires_ready() {
        let e = entry("s1");
        let (handle, _rx) = ChannelHandle::pair(SessionId::new("s1"), 4);

        assert!(!e.attach_channel(handle.clone()));
        assert!(e.channel().is_none());

        e.set_status(SessionStatus::Ready);
        assert!(e.attach_channel(handle));
        assert!(e.channel().is_some());
        assert!(e.while_attached(|| 1).is_some());

        e.detach_channel();
        assert!(e.channel().is_none());
        assert!(e.while_attached(|| 1).is_none());
    }

    #[test]
    fn test_attach_refused_after_cancel() {
        let e = entry("s1");
        e.set_status(SessionStatus::Ready);
        e.cancel();
        let (handle, _rx) = ChannelHandle::pair(SessionId::new("s1"), 4);
        assert!(!e.attach_channel(handle));
    }
}
