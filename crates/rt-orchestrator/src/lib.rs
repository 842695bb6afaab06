//! rt-orchestrator: Concurrent SSH shell sessions
//!
//! The orchestrator owns the lifecycle of every interactive session: it
//! drives the connect/authenticate/shell state machine, bridges bytes
//! between the remote shell and a subscriber, and guarantees that every
//! termination path (explicit disconnect, remote close, error, shutdown)
//! runs the same cleanup exactly once.
//!
//! File transfer lives next to it in [`sftp`], reusing the transport but
//! none of the streaming machinery.

pub mod bridge;
pub mod machine;
pub mod orchestrator;
pub mod publisher;
pub mod registry;
mod session;
pub mod sftp;
pub mod transport;

pub use orchestrator::{Orchestrator, SessionInfo};
pub use publisher::EventPublisher;
pub use registry::{SessionEntry, SessionRegistry};
pub use sftp::{EntryKind, FileTransferManager, RemoteEntry};
pub use transport::{SecretResponder, SshTransport};
