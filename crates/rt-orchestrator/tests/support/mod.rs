//! Scripted in-memory transport for orchestrator tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Notify};

use rt_core::config::AppConfig;
use rt_core::events::{EventPayload, SessionEvent};
use rt_core::traits::{
    Challenge, ChallengePrompt, ChallengeResponder, ChannelEvent, Connection, HandshakeInfo,
    ShellChannel, SinkHandle, Transport,
};
use rt_core::{AuthMethod, ConnectOptions, SessionError, SessionStatus, TerminalSize};
use rt_orchestrator::Orchestrator;

/// How the fake server behaves for a host
#[derive(Clone)]
pub enum Behavior {
    Accept,
    /// TCP connect refused
    Refuse,
    /// Never answers; fails with a timeout after the transport's timeout
    Hang,
    /// Holds the connect until the gate is opened
    Gated(Arc<Notify>),
    RejectAuth,
    /// Authenticates through one keyboard-interactive prompt
    Challenge,
    /// Authenticates, then refuses the shell request
    FailShell,
    /// The transport itself panics
    Panic,
}

pub struct MockTransport {
    default: Behavior,
    hosts: HashMap<String, Behavior>,
    timeout: Duration,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    shells: Arc<Mutex<Vec<ShellProbe>>>,
    answers: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockTransport {
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            hosts: HashMap::new(),
            timeout: Duration::from_secs(30),
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            shells: Arc::default(),
            answers: Arc::default(),
        }
    }

    /// Override the behavior for one host
    pub fn with_host(mut self, host: &str, behavior: Behavior) -> Self {
        self.hosts.insert(host.to_string(), behavior);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Connections closed by the orchestrator
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Probe for the n-th opened shell
    pub fn shell(&self, index: usize) -> ShellProbe {
        self.shells.lock().unwrap()[index].clone()
    }

    pub fn shell_count(&self) -> usize {
        self.shells.lock().unwrap().len()
    }

    /// Answers given to keyboard-interactive challenges
    pub fn answers(&self) -> Vec<Vec<String>> {
        self.answers.lock().unwrap().clone()
    }

    fn behavior(&self, host: &str) -> Behavior {
        self.hosts.get(host).cloned().unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior(&options.host);

        match &behavior {
            Behavior::Refuse => {
                return Err(SessionError::Connect(format!(
                    "connect to {} refused",
                    options.target()
                )))
            }
            Behavior::Hang => {
                tokio::time::sleep(self.timeout).await;
                return Err(SessionError::Timeout(self.timeout));
            }
            Behavior::Gated(gate) => gate.notified().await,
            Behavior::Panic => panic!("transport bug while connecting {}", options.target()),
            _ => {}
        }

        Ok(Box::new(MockConnection {
            behavior,
            closed: false,
            closes: Arc::clone(&self.closes),
            shells: Arc::clone(&self.shells),
            answers: Arc::clone(&self.answers),
        }))
    }
}

struct MockConnection {
    behavior: Behavior,
    closed: bool,
    closes: Arc<AtomicUsize>,
    shells: Arc<Mutex<Vec<ShellProbe>>>,
    answers: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn handshake(&mut self) -> Result<HandshakeInfo, SessionError> {
        Ok(HandshakeInfo {
            algorithm: "ssh-ed25519".to_string(),
            fingerprint: "bW9jaw".to_string(),
        })
    }

    async fn authenticate(
        &mut self,
        username: &str,
        auth: &AuthMethod,
        responder: &dyn ChallengeResponder,
    ) -> Result<(), SessionError> {
        match self.behavior {
            Behavior::RejectAuth => Err(SessionError::AuthFailed(format!(
                "server rejected credentials for {}",
                username
            ))),
            Behavior::Challenge => {
                let challenge = Challenge {
                    name: String::new(),
                    instructions: String::new(),
                    prompts: vec![ChallengePrompt {
                        prompt: "Password: ".to_string(),
                        echo: false,
                    }],
                };
                let answers = responder.respond(&challenge, auth.secret());
                self.answers.lock().unwrap().push(answers.clone());
                if answers.is_empty() {
                    Err(SessionError::AuthFailed("no answer to challenge".to_string()))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    async fn open_shell(
        &mut self,
        _term: &str,
        _size: TerminalSize,
    ) -> Result<Box<dyn ShellChannel>, SessionError> {
        if let Behavior::FailShell = self.behavior {
            return Err(SessionError::ChannelCreation(
                "server refused the shell request".to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let probe = ShellProbe {
            tx: tx.clone(),
            resizes: Arc::default(),
            closed: Arc::default(),
        };
        // The shell greets with a prompt as soon as it starts
        let _ = tx.send(Wire::Event(ChannelEvent::Data(Bytes::from_static(b"$ "))));

        let shell = MockShell {
            rx,
            tx,
            resizes: Arc::clone(&probe.resizes),
            closed: Arc::clone(&probe.closed),
        };
        self.shells.lock().unwrap().push(probe);
        Ok(Box::new(shell))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

enum Wire {
    Event(ChannelEvent),
    Close,
    Lost(&'static str),
}

/// Echoing shell
struct MockShell {
    rx: mpsc::UnboundedReceiver<Wire>,
    tx: mpsc::UnboundedSender<Wire>,
    resizes: Arc<Mutex<Vec<TerminalSize>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl ShellChannel for MockShell {
    async fn recv(&mut self) -> Result<Option<ChannelEvent>, SessionError> {
        match self.rx.recv().await {
            Some(Wire::Event(event)) => Ok(Some(event)),
            Some(Wire::Close) | None => Ok(None),
            Some(Wire::Lost(reason)) => Err(SessionError::ConnectionLost(reason.to_string())),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        self.tx
            .send(Wire::Event(ChannelEvent::Data(Bytes::copy_from_slice(data))))
            .map_err(|_| SessionError::Closed)
    }

    async fn resize(&mut self, size: TerminalSize) -> Result<(), SessionError> {
        self.resizes.lock().unwrap().push(size);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Test-side view of an opened shell
#[derive(Clone)]
pub struct ShellProbe {
    tx: mpsc::UnboundedSender<Wire>,
    resizes: Arc<Mutex<Vec<TerminalSize>>>,
    closed: Arc<AtomicBool>,
}

impl ShellProbe {
    /// Emit output as if the remote shell printed it
    pub fn print(&self, data: &'static [u8]) {
        let _ = self
            .tx
            .send(Wire::Event(ChannelEvent::Data(Bytes::from_static(data))));
    }

    /// Emit output on the diagnostic stream
    pub fn print_stderr(&self, data: &'static [u8]) {
        let _ = self
            .tx
            .send(Wire::Event(ChannelEvent::Stderr(Bytes::from_static(data))));
    }

    /// Exit the remote shell and close the channel
    pub fn exit(&self, code: u32) {
        let _ = self.tx.send(Wire::Event(ChannelEvent::ExitStatus(code)));
        let _ = self.tx.send(Wire::Close);
    }

    /// Drop the connection under the shell without an exit status
    pub fn lose_connection(&self, reason: &'static str) {
        let _ = self.tx.send(Wire::Lost(reason));
    }

    pub fn resizes(&self) -> Vec<TerminalSize> {
        self.resizes.lock().unwrap().clone()
    }

    /// Whether the orchestrator closed the channel
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Collects the events of one subscriber
pub struct Subscriber {
    sink: Arc<mpsc::UnboundedSender<SessionEvent>>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    seen: Vec<SessionEvent>,
}

impl Subscriber {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sink: Arc::new(tx),
            rx,
            seen: Vec::new(),
        }
    }

    pub fn handle(&self) -> SinkHandle {
        SinkHandle::new(&self.sink)
    }

    /// Every event received so far
    pub fn events(&mut self) -> &[SessionEvent] {
        while let Ok(event) = self.rx.try_recv() {
            self.seen.push(event);
        }
        &self.seen
    }

    /// Payloads received so far for `id`
    pub fn payloads(&mut self, id: &str) -> Vec<EventPayload> {
        self.events()
            .iter()
            .filter(|e| e.id.as_str() == id)
            .map(|e| e.payload.clone())
            .collect()
    }

    /// Wait until an output event for `id` contains `needle`
    pub async fn wait_for_output(&mut self, id: &str, needle: &[u8]) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if output_of(&self.payloads(id))
                .windows(needle.len())
                .any(|w| w == needle)
            {
                return true;
            }
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(event)) => self.seen.push(event),
                _ => return false,
            }
        }
    }
}

pub fn password_options(id: &str, host: &str) -> ConnectOptions {
    ConnectOptions::new(
        id,
        host,
        22,
        "root",
        AuthMethod::Password {
            password: "x".to_string(),
        },
    )
    .with_size(80, 24)
}

pub fn orchestrator(transport: &Arc<MockTransport>) -> Orchestrator {
    Orchestrator::new(Arc::clone(transport) as Arc<dyn Transport>, AppConfig::default())
}

/// Status events in order
pub fn statuses(payloads: &[EventPayload]) -> Vec<(SessionStatus, u8)> {
    payloads
        .iter()
        .filter_map(|p| match p {
            EventPayload::Status { status, progress } => Some((*status, *progress)),
            _ => None,
        })
        .collect()
}

/// All output bytes, concatenated
pub fn output_of(payloads: &[EventPayload]) -> Vec<u8> {
    payloads
        .iter()
        .filter_map(|p| match p {
            EventPayload::Output { data } => Some(data.to_vec()),
            _ => None,
        })
        .flatten()
        .collect()
}

pub fn errors(payloads: &[EventPayload]) -> Vec<String> {
    payloads
        .iter()
        .filter_map(|p| match p {
            EventPayload::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn log_messages(payloads: &[EventPayload]) -> Vec<String> {
    payloads
        .iter()
        .filter_map(|p| match p {
            EventPayload::Log(entry) => Some(entry.message.clone()),
            _ => None,
        })
        .collect()
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
