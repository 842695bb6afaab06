//! Core trait definitions

mod responder;
mod sink;
mod transport;

pub use responder::{Challenge, ChallengePrompt, ChallengeResponder};
pub use sink::{EventSink, SinkHandle};
pub use transport::{ChannelEvent, Connection, HandshakeInfo, ShellChannel, Transport};
