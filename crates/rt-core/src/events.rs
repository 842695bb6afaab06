//! Events published to session subscribers
//!
//! Every event is keyed by the session id it belongs to. The JSON form is
//! internally tagged so a UI can switch on `"type"`:
//!
//! ```json
//! {"id":"s1","type":"status","status":"connecting","progress":10}
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::time::current_time_millis;
use crate::types::{SessionId, SessionStatus, TransferStatus};

/// One event for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Session the event belongs to
    pub id: SessionId,
    /// Event body
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl SessionEvent {
    pub fn new(id: SessionId, payload: EventPayload) -> Self {
        Self { id, payload }
    }
}

/// Event body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Lifecycle status change with advisory progress (0-100)
    Status { status: SessionStatus, progress: u8 },
    /// Human-readable connection log line
    Log(LogEntry),
    /// Connection or channel failure
    Error { message: String },
    /// Bytes from the remote shell (stdout and stderr merged)
    Output { data: Bytes },
    /// The shell ended
    Exit {
        code: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<String>,
    },
    /// File-transfer session status change
    TransferStatus { status: TransferStatus },
}

impl EventPayload {
    pub fn status(status: SessionStatus, progress: u8) -> Self {
        EventPayload::Status { status, progress }
    }

    pub fn error(message: impl Into<String>) -> Self {
        EventPayload::Error {
            message: message.into(),
        }
    }

    pub fn log(level: LogLevel, message: impl Into<String>, icon: Option<&str>) -> Self {
        EventPayload::Log(LogEntry::new(level, message, icon))
    }

    /// Short name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Status { .. } => "status",
            EventPayload::Log(_) => "log",
            EventPayload::Error { .. } => "error",
            EventPayload::Output { .. } => "output",
            EventPayload::Exit { .. } => "exit",
            EventPayload::TransferStatus { .. } => "transfer_status",
        }
    }
}

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A connection log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    pub level: LogLevel,
    pub message: String,
    /// Optional glyph shown next to the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl LogEntry {
    /// Create a log line stamped with the current time
    pub fn new(level: LogLevel, message: impl Into<String>, icon: Option<&str>) -> Self {
        Self {
            timestamp: current_time_millis(),
            level,
            message: message.into(),
            icon: icon.map(str::to_string),
        }
    }
}
