//! Per-session driver task
//!
//! One task per session runs the transport steps in order, feeds their
//! outcomes to the state machine and executes the resulting effects. All
//! events of a session are published from this task, which keeps them in
//! causal order.

use std::sync::Arc;

use tokio::sync::oneshot;

use rt_core::events::{EventPayload, LogLevel};
use rt_core::traits::{
    Challenge, ChallengeResponder, Connection, ShellChannel, Transport,
};
use rt_core::{ConnectOptions, SessionError};

use crate::bridge::{BridgeEnd, ShellBridge};
use crate::machine::{self, Effect, MachineEvent, MachineState};
use crate::publisher::EventPublisher;
use crate::registry::{SessionEntry, SessionRegistry};

/// Where a connect attempt failed
enum Failure {
    /// Before or during authentication
    Transport(SessionError),
    /// Authenticated, but no shell
    Channel(SessionError),
}

/// Publishes a log line for every challenge, then defers to the policy
struct ObservedResponder<'a> {
    inner: &'a dyn ChallengeResponder,
    publisher: &'a EventPublisher,
}

impl ChallengeResponder for ObservedResponder<'_> {
    fn respond(&self, challenge: &Challenge, secret: Option<&str>) -> Vec<String> {
        self.publisher.log(
            LogLevel::Info,
            "Keyboard-interactive authentication requested",
            Some("⌨️"),
        );
        self.inner.respond(challenge, secret)
    }
}

pub(crate) struct SessionDriver {
    entry: Arc<SessionEntry>,
    registry: Arc<SessionRegistry>,
    publisher: EventPublisher,
    state: MachineState,
    term: String,
    input_buffer: usize,
    ready_tx: Option<oneshot::Sender<bool>>,
}

impl SessionDriver {
    pub(crate) fn new(
        entry: Arc<SessionEntry>,
        registry: Arc<SessionRegistry>,
        publisher: EventPublisher,
        term: String,
        input_buffer: usize,
        ready_tx: oneshot::Sender<bool>,
    ) -> Self {
        Self {
            entry,
            registry,
            publisher,
            state: MachineState::idle(),
            term,
            input_buffer,
            ready_tx: Some(ready_tx),
        }
    }

    pub(crate) async fn run(
        mut self,
        transport: Arc<dyn Transport>,
        responder: Arc<dyn ChallengeResponder>,
        options: ConnectOptions,
    ) {
        let cancel = self.entry.cancel_token();
        self.apply(MachineEvent::Start {
            target: options.target(),
            auth_kind: options.auth.kind(),
        });

        let mut connection: Option<Box<dyn Connection>> = None;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.establish(transport.as_ref(), responder.as_ref(), &options, &mut connection) => Some(result),
        };

        match outcome {
            Some(Ok(channel)) => self.stream(channel).await,
            Some(Err(Failure::Transport(e))) => {
                if e.is_auth_failure() {
                    tracing::warn!("Session {}: credentials rejected: {}", self.entry.id, e);
                } else if e.is_unreachable() {
                    tracing::info!("Session {}: host unreachable: {}", self.entry.id, e);
                } else {
                    tracing::debug!("Session {} failed to connect: {}", self.entry.id, e);
                }
                self.apply(MachineEvent::TransportFailed {
                    message: e.to_string(),
                });
            }
            Some(Err(Failure::Channel(e))) => {
                tracing::debug!("Session {} failed to open a shell: {}", self.entry.id, e);
                self.apply(MachineEvent::ChannelFailed {
                    message: e.to_string(),
                });
            }
            None => self.apply(MachineEvent::Disconnect),
        }

        if let Some(mut connection) = connection {
            connection.close().await;
        }
        self.resolve(false);
        self.entry.mark_finished();
        tracing::debug!("Session {} finished ({})", self.entry.id, self.state.status);
    }

    async fn establish(
        &mut self,
        transport: &dyn Transport,
        responder: &dyn ChallengeResponder,
        options: &ConnectOptions,
        slot: &mut Option<Box<dyn Connection>>,
    ) -> Result<Box<dyn ShellChannel>, Failure> {
        let connection = slot.insert(
            transport
                .connect(options)
                .await
                .map_err(Failure::Transport)?,
        );
        self.apply(MachineEvent::TransportConnected {
            username: options.username.clone(),
        });

        let host_key = connection.handshake().await.map_err(Failure::Transport)?;
        self.apply(MachineEvent::Handshake {
            host_key: host_key.to_string(),
        });

        let observed = ObservedResponder {
            inner: responder,
            publisher: &self.publisher,
        };
        connection
            .authenticate(&options.username, &options.auth, &observed)
            .await
            .map_err(Failure::Transport)?;
        self.apply(MachineEvent::Authenticated {
            target: options.target(),
        });

        connection
            .open_shell(&self.term, options.size)
            .await
            .map_err(Failure::Channel)
    }

    /// Attach the channel and pump it until it closes or teardown is requested
    async fn stream(&mut self, channel: Box<dyn ShellChannel>) {
        let cancel = self.entry.cancel_token();
        let (bridge, handle) = ShellBridge::new(self.entry.id.clone(), channel, self.input_buffer);

        if !self.entry.attach_channel(handle) {
            bridge.close().await;
            self.apply(MachineEvent::Disconnect);
            return;
        }

        self.apply(MachineEvent::ChannelOpened);
        self.resolve(true);

        let end = bridge
            .run(&cancel, |data| self.apply(MachineEvent::Output(data)))
            .await;

        match end {
            BridgeEnd::Cancelled => self.apply(MachineEvent::Disconnect),
            BridgeEnd::Closed { code, signal } => {
                self.apply(MachineEvent::ChannelClosed { code, signal })
            }
            BridgeEnd::Failed { message } => {
                tracing::warn!("Session {} lost its connection: {}", self.entry.id, message);
                self.apply(MachineEvent::TransportFailed { message });
            }
        }
    }

    fn apply(&mut self, event: MachineEvent) {
        let transition = machine::transition(&self.state, event);
        if transition.next.status != self.state.status {
            tracing::debug!(
                "Session {}: {} -> {}",
                self.entry.id,
                self.state.status,
                transition.next.status
            );
            self.entry.set_status(transition.next.status);
        }
        self.state = transition.next;

        for effect in transition.effects {
            match effect {
                Effect::Emit(payload @ EventPayload::Output { .. }) => {
                    self.entry
                        .while_attached(|| self.publisher.publish(payload));
                }
                Effect::Emit(payload) => {
                    self.publisher.publish(payload);
                }
                Effect::Cleanup => self.cleanup(),
            }
        }
    }

    fn cleanup(&self) {
        self.entry.detach_channel();
        if self.registry.remove_entry(&self.entry) {
            tracing::debug!("Session {} removed from registry", self.entry.id);
        }
    }

    fn resolve(&mut self, connected: bool) {
        if let Some(tx) = self.ready_tx.take() {
            let _ = tx.send(connected);
        }
    }
}
