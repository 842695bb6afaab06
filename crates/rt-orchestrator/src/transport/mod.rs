//! Transport implementations

mod responder;
mod ssh;

pub use responder::SecretResponder;
pub use ssh::{SshConnection, SshTransport};
