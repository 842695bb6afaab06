//! SSH transport built on russh
//!
//! Connects, waits for the host key, authenticates and opens interactive
//! shells. The whole connect-to-authenticated path shares one deadline, the
//! configured connect timeout; keep-alives are handled by russh itself.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Config, Handle, KeyboardInteractiveAuthResponse, Msg};
use russh::{Channel, ChannelMsg, Disconnect, Sig};
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use tokio::sync::oneshot;
use tokio::time::Instant;

use rt_core::config::TransportConfig;
use rt_core::traits::{
    Challenge, ChallengePrompt, ChallengeResponder, ChannelEvent, Connection, HandshakeInfo,
    ShellChannel, Transport,
};
use rt_core::{AuthMethod, ConnectOptions, SessionError, TerminalSize};

type HostKeyResult = Result<HandshakeInfo, SessionError>;

/// Opens SSH connections
pub struct SshTransport {
    config: Arc<Config>,
    connect_timeout: Duration,
}

impl SshTransport {
    /// Create a transport with the given timeout and keep-alive policy
    pub fn new(transport: &TransportConfig) -> Self {
        let config = Config {
            keepalive_interval: Some(transport.keepalive_interval),
            keepalive_max: transport.keepalive_max,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            connect_timeout: transport.connect_timeout,
        }
    }

    /// Open a connection, returning the concrete type
    pub async fn establish(&self, options: &ConnectOptions) -> Result<SshConnection, SessionError> {
        let deadline = Instant::now() + self.connect_timeout;
        let (key_tx, key_rx) = oneshot::channel();
        let handler = ClientHandler {
            expected_host_key: options.host_key.clone(),
            key_tx: Some(key_tx),
        };

        tracing::debug!("Connecting to {}", options.target());
        let handle = tokio::time::timeout_at(
            deadline,
            client::connect(
                Arc::clone(&self.config),
                (options.host.as_str(), options.port),
                handler,
            ),
        )
        .await
        .map_err(|_| SessionError::Timeout(self.connect_timeout))?
        .map_err(|e| SessionError::Connect(e.to_string()))?;

        Ok(SshConnection {
            handle,
            key_rx: Some(key_rx),
            host_key: None,
            deadline,
            timeout: self.connect_timeout,
            closed: false,
        })
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, SessionError> {
        Ok(Box::new(self.establish(options).await?))
    }
}

/// One SSH connection
pub struct SshConnection {
    handle: Handle<ClientHandler>,
    key_rx: Option<oneshot::Receiver<HostKeyResult>>,
    host_key: Option<HandshakeInfo>,
    deadline: Instant,
    timeout: Duration,
    closed: bool,
}

impl SshConnection {
    async fn authenticate_inner(
        &mut self,
        username: &str,
        auth: &AuthMethod,
        responder: &dyn ChallengeResponder,
    ) -> Result<(), SessionError> {
        match auth {
            AuthMethod::Password { password } => {
                if !password.is_empty()
                    && self
                        .handle
                        .authenticate_password(username, password.as_str())
                        .await
                        .map_err(auth_error)?
                {
                    return Ok(());
                }
                tracing::debug!("Password not accepted, trying keyboard-interactive");
                if self
                    .keyboard_interactive(username, auth.secret(), responder)
                    .await?
                {
                    return Ok(());
                }
            }
            AuthMethod::PrivateKey {
                private_key,
                passphrase,
            } => {
                let key = russh_keys::decode_secret_key(private_key, passphrase.as_deref())
                    .map_err(|e| SessionError::InvalidKey(e.to_string()))?;
                if self
                    .handle
                    .authenticate_publickey(username, Arc::new(key))
                    .await
                    .map_err(auth_error)?
                {
                    return Ok(());
                }
            }
        }

        Err(SessionError::AuthFailed(format!(
            "server rejected credentials for {}",
            username
        )))
    }

    async fn keyboard_interactive(
        &mut self,
        username: &str,
        secret: Option<&str>,
        responder: &dyn ChallengeResponder,
    ) -> Result<bool, SessionError> {
        let mut response = self
            .handle
            .authenticate_keyboard_interactive_start(username, None::<String>)
            .await
            .map_err(auth_error)?;

        loop {
            match response {
                KeyboardInteractiveAuthResponse::Success => return Ok(true),
                KeyboardInteractiveAuthResponse::Failure => return Ok(false),
                KeyboardInteractiveAuthResponse::InfoRequest {
                    name,
                    instructions,
                    prompts,
                } => {
                    let challenge = Challenge {
                        name,
                        instructions,
                        prompts: prompts
                            .into_iter()
                            .map(|p| ChallengePrompt {
                                prompt: p.prompt,
                                echo: p.echo,
                            })
                            .collect(),
                    };
                    let answers = responder.respond(&challenge, secret);
                    response = self
                        .handle
                        .authenticate_keyboard_interactive_respond(answers)
                        .await
                        .map_err(auth_error)?;
                }
            }
        }
    }

    /// Open a session channel, optionally failing when the server refuses
    async fn open_channel(&self) -> Result<Channel<Msg>, SessionError> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::ChannelCreation(e.to_string()))
    }

    async fn start_shell(
        &self,
        term: &str,
        size: TerminalSize,
    ) -> Result<SshShell, SessionError> {
        let mut channel = self.open_channel().await?;
        channel
            .request_pty(false, term, size.cols as u32, size.rows as u32, 0, 0, &[])
            .await
            .map_err(|e| SessionError::ChannelCreation(e.to_string()))?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| SessionError::ChannelCreation(e.to_string()))?;

        // Output can race the shell reply; keep it for the first recv()
        let mut pending = VecDeque::new();
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Success) => break,
                Some(ChannelMsg::Failure) => {
                    return Err(SessionError::ChannelCreation(
                        "server refused the shell request".to_string(),
                    ))
                }
                Some(ChannelMsg::Close) | None => {
                    return Err(SessionError::ChannelCreation(
                        "channel closed before the shell started".to_string(),
                    ))
                }
                Some(msg) => pending.push_back(msg),
            }
        }

        Ok(SshShell {
            channel,
            pending,
            exited: false,
        })
    }

    /// Start the `sftp` subsystem on a new channel
    pub async fn open_sftp(&mut self) -> Result<SftpSession, SessionError> {
        let channel = self.open_channel().await?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SessionError::ChannelCreation(e.to_string()))?;

        tokio::time::timeout(self.timeout, SftpSession::new(channel.into_stream()))
            .await
            .map_err(|_| SessionError::Timeout(self.timeout))?
            .map_err(|e| SessionError::Transfer(e.to_string()))
    }
}

#[async_trait]
impl Connection for SshConnection {
    async fn handshake(&mut self) -> Result<HandshakeInfo, SessionError> {
        if let Some(info) = &self.host_key {
            return Ok(info.clone());
        }

        let key_rx = self.key_rx.take().ok_or_else(|| {
            SessionError::Handshake("host key verification already failed".to_string())
        })?;

        let info = tokio::time::timeout_at(self.deadline, key_rx)
            .await
            .map_err(|_| SessionError::Timeout(self.timeout))?
            .map_err(|_| {
                SessionError::Handshake("connection closed during key exchange".to_string())
            })??;

        self.host_key = Some(info.clone());
        Ok(info)
    }

    async fn authenticate(
        &mut self,
        username: &str,
        auth: &AuthMethod,
        responder: &dyn ChallengeResponder,
    ) -> Result<(), SessionError> {
        let deadline = self.deadline;
        let timeout = self.timeout;
        tokio::time::timeout_at(deadline, self.authenticate_inner(username, auth, responder))
            .await
            .map_err(|_| SessionError::Timeout(timeout))?
    }

    async fn open_shell(
        &mut self,
        term: &str,
        size: TerminalSize,
    ) -> Result<Box<dyn ShellChannel>, SessionError> {
        let shell = tokio::time::timeout(self.timeout, self.start_shell(term, size))
            .await
            .map_err(|_| SessionError::Timeout(self.timeout))??;
        Ok(Box::new(shell))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("Disconnect failed: {}", e);
        }
    }
}

fn auth_error(e: russh::Error) -> SessionError {
    SessionError::AuthFailed(e.to_string())
}

/// Interactive shell on an SSH channel
struct SshShell {
    channel: Channel<Msg>,
    pending: VecDeque<ChannelMsg>,
    /// An exit status or signal was received
    exited: bool,
}

/// The channel ended without a close message: clean only if the process
/// already reported how it exited
fn closed_without_close(exited: bool) -> Result<Option<ChannelEvent>, SessionError> {
    if exited {
        Ok(None)
    } else {
        Err(SessionError::ConnectionLost(
            "session ended before the shell exited".to_string(),
        ))
    }
}

fn signal_name(sig: Sig) -> String {
    match sig {
        Sig::Custom(name) => name,
        other => format!("{:?}", other),
    }
}

#[async_trait]
impl ShellChannel for SshShell {
    async fn recv(&mut self) -> Result<Option<ChannelEvent>, SessionError> {
        loop {
            let msg = match self.pending.pop_front() {
                Some(msg) => msg,
                // russh drops the channel senders when the session task ends
                None => match self.channel.wait().await {
                    Some(msg) => msg,
                    None => return closed_without_close(self.exited),
                },
            };

            let event = match msg {
                ChannelMsg::Data { data } => ChannelEvent::Data(Bytes::copy_from_slice(&data)),
                ChannelMsg::ExtendedData { data, ext: 1 } => {
                    ChannelEvent::Stderr(Bytes::copy_from_slice(&data))
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    self.exited = true;
                    ChannelEvent::ExitStatus(exit_status)
                }
                ChannelMsg::ExitSignal { signal_name: sig, .. } => {
                    self.exited = true;
                    ChannelEvent::ExitSignal(signal_name(sig))
                }
                ChannelMsg::Eof => ChannelEvent::Eof,
                ChannelMsg::Close => return Ok(None),
                _ => continue,
            };
            return Ok(Some(event));
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        self.channel
            .data(data)
            .await
            .map_err(|e| SessionError::ChannelIo(e.to_string()))
    }

    async fn resize(&mut self, size: TerminalSize) -> Result<(), SessionError> {
        self.channel
            .window_change(size.cols as u32, size.rows as u32, 0, 0)
            .await
            .map_err(|e| SessionError::ChannelIo(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.channel.eof().await;
        let _ = self.channel.close().await;
    }
}

/// SSH client handler
///
/// Reports the server's host key to the waiting [`SshConnection`] and
/// rejects it when a pinned fingerprint does not match.
struct ClientHandler {
    /// Expected host key fingerprint (`SHA256:...`)
    expected_host_key: Option<String>,
    key_tx: Option<oneshot::Sender<HostKeyResult>>,
}

fn fingerprint_matches(expected: &str, actual: &str) -> bool {
    expected.strip_prefix("SHA256:").unwrap_or(expected) == actual
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let info = HandshakeInfo {
            algorithm: server_public_key.name().to_string(),
            fingerprint: server_public_key.fingerprint(),
        };
        tracing::debug!("Server host key: {}", info);

        let result = match &self.expected_host_key {
            Some(expected) if !fingerprint_matches(expected, &info.fingerprint) => {
                tracing::warn!(
                    "Host key differs from configured: expected {}, got {}",
                    expected,
                    info
                );
                Err(SessionError::HostKeyRejected(format!(
                    "expected {}, got SHA256:{}",
                    expected, info.fingerprint
                )))
            }
            _ => Ok(info),
        };

        let accepted = result.is_ok();
        if let Some(tx) = self.key_tx.take() {
            let _ = tx.send(result);
        }
        Ok(accepted)
    }
}
