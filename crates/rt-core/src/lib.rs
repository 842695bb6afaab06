//! rt-core: Core types, events, and configuration for remotty
//!
//! This crate provides the shared domain types, event shapes, error
//! taxonomy, and capability traits used by the session orchestrator
//! and the CLI.

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{ConfigError, RtError, SessionError};
pub use events::{EventPayload, LogEntry, LogLevel, SessionEvent};
pub use types::{
    AuthKind, AuthMethod, ConnectOptions, SessionId, SessionStatus, TerminalSize, TransferStatus,
};
