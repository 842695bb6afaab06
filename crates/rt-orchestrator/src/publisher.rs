//! Event publisher
//!
//! Turns session transitions into id-keyed events for the subscriber.
//! Delivery is best-effort: when the subscriber is gone the event is
//! dropped without error.

use bytes::Bytes;

use rt_core::events::{EventPayload, LogLevel, SessionEvent};
use rt_core::traits::SinkHandle;
use rt_core::{SessionId, SessionStatus, TransferStatus};

/// Publishes events for one session
#[derive(Debug, Clone)]
pub struct EventPublisher {
    id: SessionId,
    sink: SinkHandle,
}

impl EventPublisher {
    pub fn new(id: SessionId, sink: SinkHandle) -> Self {
        Self { id, sink }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Deliver one event; returns false if the subscriber is gone
    pub fn publish(&self, payload: EventPayload) -> bool {
        match self.sink.upgrade() {
            Some(sink) => {
                sink.deliver(SessionEvent::new(self.id.clone(), payload));
                true
            }
            None => {
                tracing::trace!(
                    "Subscriber for {} is gone, dropping {} event",
                    self.id,
                    payload.kind()
                );
                false
            }
        }
    }

    pub fn status(&self, status: SessionStatus, progress: u8) -> bool {
        self.publish(EventPayload::status(status, progress))
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, icon: Option<&str>) -> bool {
        self.publish(EventPayload::log(level, message, icon))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.publish(EventPayload::error(message))
    }

    pub fn output(&self, data: Bytes) -> bool {
        self.publish(EventPayload::Output { data })
    }

    pub fn transfer_status(&self, status: TransferStatus) -> bool {
        self.publish(EventPayload::TransferStatus { status })
    }
}
