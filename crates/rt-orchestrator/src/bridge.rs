//! Shell channel bridge
//!
//! Pumps bytes between an open [`ShellChannel`] and the session's
//! subscriber. Output (stdout and stderr merged) flows out through a
//! callback; input and resize requests flow in through a bounded queue fed
//! by [`ChannelHandle`], so callers never wait on the network.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use rt_core::traits::{ChannelEvent, ShellChannel};
use rt_core::{SessionError, SessionId, TerminalSize};

/// Request from the facade to the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    Write(Bytes),
    Resize(TerminalSize),
}

/// Cheap, cloneable sender side of a bridge
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: SessionId,
    tx: mpsc::Sender<ChannelCommand>,
}

impl ChannelHandle {
    /// Create a handle and the queue it feeds
    pub fn pair(id: SessionId, capacity: usize) -> (Self, mpsc::Receiver<ChannelCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }

    /// Queue input for the remote shell
    pub fn write(&self, data: Bytes) -> Result<(), SessionError> {
        self.send(ChannelCommand::Write(data))
    }

    /// Queue a window-change request
    pub fn resize(&self, size: TerminalSize) -> Result<(), SessionError> {
        self.send(ChannelCommand::Resize(size))
    }

    fn send(&self, command: ChannelCommand) -> Result<(), SessionError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::Backpressure(self.id.clone()),
            TrySendError::Closed(_) => SessionError::Closed,
        })
    }
}

/// Why the bridge stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEnd {
    /// Local teardown was requested
    Cancelled,
    /// The remote side closed the channel
    Closed { code: u32, signal: Option<String> },
    /// The connection under the channel failed
    Failed { message: String },
}

/// Owns an open shell channel while the session is ready
pub struct ShellBridge {
    id: SessionId,
    channel: Box<dyn ShellChannel>,
    commands: mpsc::Receiver<ChannelCommand>,
}

impl ShellBridge {
    /// Wrap `channel`, returning the bridge and the handle that feeds it
    pub fn new(
        id: SessionId,
        channel: Box<dyn ShellChannel>,
        capacity: usize,
    ) -> (Self, ChannelHandle) {
        let (handle, commands) = ChannelHandle::pair(id.clone(), capacity);
        (
            Self {
                id,
                channel,
                commands,
            },
            handle,
        )
    }

    /// Pump until the channel closes or `cancel` fires, then close the
    /// channel.
    pub async fn run(
        mut self,
        cancel: &CancellationToken,
        mut on_output: impl FnMut(Bytes),
    ) -> BridgeEnd {
        let mut exit_code = None;
        let mut exit_signal = None;

        let end = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break BridgeEnd::Cancelled,

                event = self.channel.recv() => match event {
                    Ok(Some(ChannelEvent::Data(data))) | Ok(Some(ChannelEvent::Stderr(data))) => {
                        on_output(data);
                    }
                    Ok(Some(ChannelEvent::ExitStatus(code))) => {
                        tracing::debug!("Shell {} exited with status {}", self.id, code);
                        exit_code = Some(code);
                    }
                    Ok(Some(ChannelEvent::ExitSignal(signal))) => {
                        tracing::debug!("Shell {} killed by signal {}", self.id, signal);
                        exit_signal = Some(signal);
                    }
                    Ok(Some(ChannelEvent::Eof)) => {
                        tracing::trace!("Shell {} sent EOF", self.id);
                    }
                    Ok(None) => {
                        break BridgeEnd::Closed {
                            code: exit_code.unwrap_or(0),
                            signal: exit_signal,
                        };
                    }
                    Err(e) => {
                        break BridgeEnd::Failed {
                            message: e.to_string(),
                        };
                    }
                },

                Some(command) = self.commands.recv() => match command {
                    ChannelCommand::Write(data) => {
                        if let Err(e) = self.channel.write(&data).await {
                            tracing::warn!("Write to {} failed: {}", self.id, e);
                        }
                    }
                    ChannelCommand::Resize(size) => {
                        if let Err(e) = self.channel.resize(size).await {
                            tracing::warn!("Resize of {} failed: {}", self.id, e);
                        }
                    }
                },
            }
        };

        self.close().await;
        end
    }

    /// Close the channel without pumping
    pub async fn close(mut self) {
        self.commands.close();
        self.channel.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// In-memory channel: test pushes events in, writes are recorded
    struct FakeChannel {
        events: mpsc::UnboundedReceiver<Result<ChannelEvent, SessionError>>,
        written: Arc<Mutex<Vec<u8>>>,
        resized: Arc<Mutex<Vec<TerminalSize>>>,
        closed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl ShellChannel for FakeChannel {
        async fn recv(&mut self) -> Result<Option<ChannelEvent>, SessionError> {
            self.events.recv().await.transpose()
        }

        async fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn resize(&mut self, size: TerminalSize) -> Result<(), SessionError> {
            self.resized.lock().unwrap().push(size);
            Ok(())
        }

        async fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    struct Probe {
        events: mpsc::UnboundedSender<Result<ChannelEvent, SessionError>>,
        written: Arc<Mutex<Vec<u8>>>,
        resized: Arc<Mutex<Vec<TerminalSize>>>,
        closed: Arc<Mutex<bool>>,
    }

    fn fake(capacity: usize) -> (ShellBridge, ChannelHandle, Probe) {
        let (tx, rx) = mpsc::unbounded_channel();
        let probe = Probe {
            events: tx,
            written: Arc::default(),
            resized: Arc::default(),
            closed: Arc::default(),
        };
        let channel = FakeChannel {
            events: rx,
            written: probe.written.clone(),
            resized: probe.resized.clone(),
            closed: probe.closed.clone(),
        };
        let (bridge, handle) = ShellBridge::new(SessionId::new("s1"), Box::new(channel), capacity);
        (bridge, handle, probe)
    }

    #[tokio::test]
    async fn test_merges_stdout_and_stderr_and_reports_exit() {
        let (bridge, _handle, probe) = fake(8);
        probe
            .events
            .send(Ok(ChannelEvent::Data(Bytes::from_static(b"out "))))
            .unwrap();
        probe
            .events
            .send(Ok(ChannelEvent::Stderr(Bytes::from_static(b"err"))))
            .unwrap();
        probe.events.send(Ok(ChannelEvent::ExitStatus(2))).unwrap();
        probe.events.send(Ok(ChannelEvent::Eof)).unwrap();
        let closed = probe.closed.clone();
        drop(probe);

        let mut output = Vec::new();
        let end = bridge
            .run(&CancellationToken::new(), |data| output.extend_from_slice(&data))
            .await;

        assert_eq!(output, b"out err");
        assert_eq!(
            end,
            BridgeEnd::Closed {
                code: 2,
                signal: None
            }
        );
        assert!(*closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_exit_code_defaults_to_zero() {
        let (bridge, _handle, probe) = fake(8);
        probe
            .events
            .send(Ok(ChannelEvent::ExitSignal("TERM".into())))
            .unwrap();
        drop(probe);

        let end = bridge.run(&CancellationToken::new(), |_| {}).await;
        assert_eq!(
            end,
            BridgeEnd::Closed {
                code: 0,
                signal: Some("TERM".into())
            }
        );
    }

    #[tokio::test]
    async fn test_lost_connection_is_a_failure_not_an_exit() {
        let (bridge, _handle, probe) = fake(8);
        probe
            .events
            .send(Ok(ChannelEvent::Data(Bytes::from_static(b"partial"))))
            .unwrap();
        probe
            .events
            .send(Err(SessionError::ConnectionLost("keep-alive timeout".into())))
            .unwrap();

        let mut output = Vec::new();
        let end = bridge
            .run(&CancellationToken::new(), |data| output.extend_from_slice(&data))
            .await;

        assert_eq!(output, b"partial");
        assert_eq!(
            end,
            BridgeEnd::Failed {
                message: "Connection lost: keep-alive timeout".into()
            }
        );
        assert!(*probe.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_forwards_writes_and_resizes() {
        let (bridge, handle, probe) = fake(8);
        let cancel = CancellationToken::new();

        handle.write(Bytes::from_static(b"ls\n")).unwrap();
        handle.resize(TerminalSize::new(120, 40)).unwrap();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { bridge.run(&cancel, |_| {}).await })
        };

        for _ in 0..100 {
            if !probe.resized.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        assert_eq!(task.await.unwrap(), BridgeEnd::Cancelled);
        assert_eq!(probe.written.lock().unwrap().as_slice(), b"ls\n");
        assert_eq!(
            probe.resized.lock().unwrap().as_slice(),
            &[TerminalSize::new(120, 40)]
        );
        assert!(*probe.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_full_queue_is_backpressure() {
        let (_bridge, handle, _probe) = fake(1);
        handle.write(Bytes::from_static(b"a")).unwrap();
        let err = handle.write(Bytes::from_static(b"b")).unwrap_err();
        assert!(matches!(err, SessionError::Backpressure(_)));
    }

    #[tokio::test]
    async fn test_write_after_bridge_gone_is_closed() {
        let (bridge, handle, _probe) = fake(4);
        bridge.close().await;
        let err = handle.write(Bytes::from_static(b"a")).unwrap_err();
        assert!(matches!(err, SessionError::Closed));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_pending_output() {
        let (bridge, _handle, probe) = fake(4);
        probe
            .events
            .send(Ok(ChannelEvent::Data(Bytes::from_static(b"late"))))
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut seen = false;
        let end = bridge.run(&cancel, |_| seen = true).await;
        assert_eq!(end, BridgeEnd::Cancelled);
        assert!(!seen);
    }
}
