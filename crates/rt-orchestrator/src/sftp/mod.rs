//! File transfer over SFTP
//!
//! Request/response file operations keyed by the same session ids as the
//! shell sessions, each on its own authenticated connection. There is no
//! streaming state machine here: a transfer session is either connecting
//! or connected.

mod entry;
mod manager;
mod remote;
mod ssh;

pub use entry::{join_remote, parse_mode, permission_string, sort_entries, EntryKind, RemoteEntry};
pub use manager::FileTransferManager;
pub use remote::{DirItem, FileTransport, RemoteFs};
pub use ssh::SftpTransport;
