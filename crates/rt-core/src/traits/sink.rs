//! Event subscriber traits

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;

use crate::events::SessionEvent;

/// Receiver of session events, typically a UI surface
pub trait EventSink: Send + Sync {
    /// Deliver one event. Must not block.
    fn deliver(&self, event: SessionEvent);
}

impl EventSink for mpsc::UnboundedSender<SessionEvent> {
    fn deliver(&self, event: SessionEvent) {
        // A closed receiver means the subscriber went away
        let _ = self.send(event);
    }
}

/// Non-owning reference to a subscriber
///
/// The orchestrator never keeps a subscriber alive. Once the last strong
/// reference is dropped, events routed through this handle are discarded.
#[derive(Clone)]
pub struct SinkHandle(Weak<dyn EventSink>);

impl SinkHandle {
    /// Create a handle observing `sink`
    pub fn new<S: EventSink + 'static>(sink: &Arc<S>) -> Self {
        let sink: Arc<dyn EventSink> = sink.clone();
        Self(Arc::downgrade(&sink))
    }

    /// A handle with no subscriber behind it
    pub fn detached() -> Self {
        let weak: Weak<dyn EventSink> = Weak::<mpsc::UnboundedSender<SessionEvent>>::new();
        Self(weak)
    }

    /// Get the subscriber if it is still alive
    pub fn upgrade(&self) -> Option<Arc<dyn EventSink>> {
        self.0.upgrade()
    }

    /// Check whether the subscriber is still alive
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}
