//! Session state machine
//!
//! A pure transition function: `(state, event) -> (next state, effects)`.
//! The session driver feeds it the named events reported by the transport
//! and executes the returned effects in order. Nothing here performs I/O.
//!
//! ```text
//! idle -> connecting (10) -> authenticating (20, 30) -> ready (90, 100)
//!                                                         |
//!        any non-terminal --error--> error                 +--close--> disconnected
//!        any non-terminal --disconnect--> disconnected
//! ```
//!
//! `error` and `disconnected` are terminal: once reached, every further
//! event is ignored, so each attempt reports exactly one terminal status.

use bytes::Bytes;

use rt_core::events::{EventPayload, LogLevel};
use rt_core::{AuthKind, SessionStatus};

/// Progress reported when a connect starts
pub const PROGRESS_CONNECTING: u8 = 10;
/// Progress once the server is reached and authentication begins
pub const PROGRESS_AUTHENTICATING: u8 = 20;
/// Progress once the key exchange completed
pub const PROGRESS_HANDSHAKE: u8 = 30;
/// Progress once authenticated
pub const PROGRESS_AUTHENTICATED: u8 = 90;
/// Progress once the shell channel is open
pub const PROGRESS_SHELL: u8 = 100;

/// Snapshot of one session's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineState {
    pub status: SessionStatus,
    pub progress: u8,
    /// Whether the interactive channel has been confirmed open
    pub channel_open: bool,
}

impl MachineState {
    /// State before `connect`
    pub fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            progress: 0,
            channel_open: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn with(status: SessionStatus, progress: u8, channel_open: bool) -> Self {
        Self {
            status,
            progress,
            channel_open,
        }
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Something that happened to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    /// `connect` was called
    Start {
        target: String,
        auth_kind: AuthKind,
    },
    /// The server was reached
    TransportConnected { username: String },
    /// Key exchange completed
    Handshake { host_key: String },
    /// Credentials accepted
    Authenticated { target: String },
    /// Interactive channel opened
    ChannelOpened,
    /// Bytes from the shell
    Output(Bytes),
    /// Connect, handshake or authentication failed, or the connection
    /// dropped under an open shell
    TransportFailed { message: String },
    /// Authenticated, but the shell could not be opened
    ChannelFailed { message: String },
    /// The remote side closed the channel
    ChannelClosed { code: u32, signal: Option<String> },
    /// Local disconnect requested
    Disconnect,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Publish an event to the session's subscriber
    Emit(EventPayload),
    /// Release the channel, the transport and the registry entry
    Cleanup,
}

/// Result of applying one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: MachineState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn ignore(state: &MachineState) -> Self {
        Self {
            next: *state,
            effects: Vec::new(),
        }
    }
}

fn status(status: SessionStatus, progress: u8) -> Effect {
    Effect::Emit(EventPayload::status(status, progress))
}

fn log(level: LogLevel, message: impl Into<String>, icon: &str) -> Effect {
    Effect::Emit(EventPayload::log(level, message, Some(icon)))
}

fn fail(message: String) -> Transition {
    Transition {
        next: MachineState::with(SessionStatus::Error, 0, false),
        effects: vec![
            Effect::Emit(EventPayload::error(message.clone())),
            log(LogLevel::Error, format!("Connection error: {}", message), "❌"),
            status(SessionStatus::Error, 0),
            Effect::Cleanup,
        ],
    }
}

fn close(exit: Option<(u32, Option<String>)>) -> Transition {
    let mut effects = Vec::with_capacity(4);
    if let Some((code, signal)) = exit {
        effects.push(Effect::Emit(EventPayload::Exit { code, signal }));
    }
    effects.push(status(SessionStatus::Disconnected, 0));
    effects.push(log(LogLevel::Info, "Connection closed", "🔒"));
    effects.push(Effect::Cleanup);
    Transition {
        next: MachineState::with(SessionStatus::Disconnected, 0, false),
        effects,
    }
}

/// Apply `event` to `state`
pub fn transition(state: &MachineState, event: MachineEvent) -> Transition {
    use SessionStatus::*;

    if state.is_terminal() {
        return Transition::ignore(state);
    }

    match (state.status, event) {
        (Idle, MachineEvent::Start { target, auth_kind }) => {
            let auth_log = match auth_kind {
                AuthKind::PrivateKey => {
                    log(LogLevel::Info, "Using private key authentication", "🔐")
                }
                AuthKind::Password => log(LogLevel::Info, "Using password authentication", "🔑"),
            };
            Transition {
                next: MachineState::with(Connecting, PROGRESS_CONNECTING, false),
                effects: vec![
                    status(Connecting, PROGRESS_CONNECTING),
                    log(LogLevel::Info, format!("Connecting to {}...", target), "🔌"),
                    auth_log,
                ],
            }
        }

        (Connecting, MachineEvent::TransportConnected { username }) => Transition {
            next: MachineState::with(Authenticating, PROGRESS_AUTHENTICATING, false),
            effects: vec![
                status(Authenticating, PROGRESS_AUTHENTICATING),
                log(
                    LogLevel::Info,
                    format!("Authenticating as {}...", username),
                    "👤",
                ),
            ],
        },

        (Connecting | Authenticating, MachineEvent::Handshake { host_key }) => Transition {
            next: MachineState::with(Authenticating, PROGRESS_HANDSHAKE, false),
            effects: vec![
                status(Authenticating, PROGRESS_HANDSHAKE),
                log(
                    LogLevel::Info,
                    format!("Handshake completed. Host key: {}", host_key),
                    "🤝",
                ),
            ],
        },

        (Connecting | Authenticating, MachineEvent::Authenticated { target }) => Transition {
            next: MachineState::with(Ready, PROGRESS_AUTHENTICATED, false),
            effects: vec![
                status(Ready, PROGRESS_AUTHENTICATED),
                log(LogLevel::Success, format!("Connected to {}", target), "✅"),
                log(LogLevel::Info, "Creating shell session...", "⚙️"),
            ],
        },

        (Ready, MachineEvent::ChannelOpened) if !state.channel_open => Transition {
            next: MachineState::with(Ready, PROGRESS_SHELL, true),
            effects: vec![
                status(Ready, PROGRESS_SHELL),
                log(LogLevel::Success, "Shell session established", "🖥️"),
            ],
        },

        (Ready, MachineEvent::Output(data)) if state.channel_open => Transition {
            next: *state,
            effects: vec![Effect::Emit(EventPayload::Output { data })],
        },

        (_, MachineEvent::TransportFailed { message }) => fail(message),

        (_, MachineEvent::ChannelFailed { message }) => {
            fail(format!("Failed to create shell: {}", message))
        }

        (Ready, MachineEvent::ChannelClosed { code, signal }) if state.channel_open => {
            close(Some((code, signal)))
        }

        (_, MachineEvent::ChannelClosed { .. }) => close(None),

        (_, MachineEvent::Disconnect) => {
            if state.channel_open {
                close(Some((0, None)))
            } else {
                close(None)
            }
        }

        (current, event) => {
            tracing::trace!("Ignoring {:?} in state {}", event, current);
            Transition::ignore(state)
        }
    }
}
