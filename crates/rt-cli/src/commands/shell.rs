//! Interactive shell command
//!
//! Connects one session through the orchestrator, prints its connection
//! log until the shell is ready, then puts the local terminal in raw mode
//! and pipes keystrokes and output until the remote side closes or the user
//! detaches with Ctrl+].

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::sync::mpsc;

use rt_core::config::{AppConfig, HostBook};
use rt_core::events::{EventPayload, SessionEvent};
use rt_core::traits::SinkHandle;
use rt_core::{SessionId, SessionStatus, TerminalSize};
use rt_orchestrator::Orchestrator;

use crate::output::{print_error, print_info, print_log, print_success, print_warning};

/// Restores cooked mode when dropped
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// How the interactive loop ended
enum Ending {
    Detached,
    Closed {
        code: Option<u32>,
        signal: Option<String>,
        error: Option<String>,
    },
}

/// Open an interactive shell on a saved host.
///
/// Returns the remote exit code, or 0 when the user detached.
pub async fn shell_command(config: AppConfig, hosts: &Path, host: &str) -> Result<u32> {
    let book = HostBook::load_or_default(hosts)
        .with_context(|| format!("Failed to load hosts from {:?}", hosts))?;
    let profile = book.require(host)?;

    let size = terminal::size()
        .map(|(cols, rows)| TerminalSize::new(cols, rows))
        .unwrap_or_default();
    let id = SessionId::from(profile.name.clone());
    let options = profile.connect_options(id.clone(), size);

    let orchestrator = Orchestrator::ssh(config);
    let (tx, mut events) = mpsc::unbounded_channel::<SessionEvent>();
    let sink = Arc::new(tx);

    // Output that raced ahead of the connect result
    let mut pending = Vec::new();

    let connected = {
        let connect = orchestrator.connect(options, SinkHandle::new(&sink));
        tokio::pin!(connect);
        loop {
            tokio::select! {
                ok = &mut connect => break ok,
                Some(event) = events.recv() => show_progress(event.payload, &mut pending),
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        show_progress(event.payload, &mut pending);
    }

    if !connected {
        orchestrator.shutdown().await;
        anyhow::bail!("Could not open a shell on '{}'", host);
    }

    print_info("Press Ctrl+] to detach");
    let ending = interact(&orchestrator, &id, &mut events, pending).await?;

    let code = match ending {
        Ending::Detached => {
            orchestrator.disconnect(&id).await;
            print_success(&format!("Detached from {}", host));
            0
        }
        Ending::Closed {
            code,
            signal,
            error,
        } => {
            if let Some(message) = error {
                print_error(&message);
            }
            match (code, signal) {
                (_, Some(signal)) => {
                    print_warning(&format!("Remote shell killed by {}", signal));
                    1
                }
                (Some(code), None) => {
                    if code != 0 {
                        print_warning(&format!("Remote shell exited with code {}", code));
                    }
                    code
                }
                (None, None) => 0,
            }
        }
    };

    orchestrator.shutdown().await;
    Ok(code)
}

fn show_progress(payload: EventPayload, pending: &mut Vec<u8>) {
    match payload {
        EventPayload::Log(entry) => print_log(&entry),
        EventPayload::Output { data } => pending.extend_from_slice(&data),
        EventPayload::Status { status, progress } => {
            tracing::debug!("Session status {} ({}%)", status, progress);
        }
        _ => {}
    }
}

async fn interact(
    orchestrator: &Orchestrator,
    id: &SessionId,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    pending: Vec<u8>,
) -> Result<Ending> {
    let _raw = RawMode::enable()?;
    let mut stdout = std::io::stdout();
    stdout.write_all(&pending)?;
    stdout.flush()?;

    // Terminal events come from a blocking reader
    let (term_tx, mut term_rx) = mpsc::channel::<Event>(256);
    let reader = tokio::task::spawn_blocking(move || {
        while !term_tx.is_closed() {
            match event::poll(Duration::from_millis(50)) {
                Ok(true) => match event::read() {
                    Ok(evt) => {
                        if term_tx.blocking_send(evt).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                Ok(false) => {}
                Err(_) => break,
            }
        }
    });

    let mut exit: Option<(u32, Option<String>)> = None;
    let mut error = None;

    let ending = loop {
        tokio::select! {
            Some(evt) = term_rx.recv() => match evt {
                Event::Key(KeyEvent { code, modifiers, kind, .. }) => {
                    if kind == KeyEventKind::Release {
                        continue;
                    }
                    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char(']') {
                        break Ending::Detached;
                    }
                    let data = key_to_bytes(code, modifiers);
                    if !data.is_empty() && !orchestrator.write(id, &data) {
                        tracing::debug!("Input for {} was not accepted", id);
                    }
                }
                Event::Paste(text) => {
                    orchestrator.write(id, text.as_bytes());
                }
                Event::Resize(cols, rows) => {
                    orchestrator.resize(id, cols, rows);
                }
                _ => {}
            },

            event = events.recv() => {
                let Some(event) = event else {
                    break Ending::Closed { code: None, signal: None, error };
                };
                match event.payload {
                    EventPayload::Output { data } => {
                        stdout.write_all(&data)?;
                        stdout.flush()?;
                    }
                    EventPayload::Exit { code, signal } => exit = Some((code, signal)),
                    EventPayload::Error { message } => error = Some(message),
                    EventPayload::Status {
                        status: SessionStatus::Disconnected | SessionStatus::Error,
                        ..
                    } => {
                        let (code, signal) = match exit.take() {
                            Some((code, signal)) => (Some(code), signal),
                            None => (None, None),
                        };
                        break Ending::Closed { code, signal, error };
                    }
                    _ => {}
                }
            }
        }
    };

    drop(term_rx);
    let _ = reader.await;
    // Leave the cursor on a fresh line
    stdout.write_all(b"\r\n")?;
    stdout.flush()?;
    Ok(ending)
}

/// Convert a key event to the bytes a terminal would send
pub fn key_to_bytes(code: KeyCode, modifiers: KeyModifiers) -> Vec<u8> {
    use KeyCode::*;

    match code {
        Char(c) if modifiers.contains(KeyModifiers::CONTROL) => match control_byte(c) {
            Some(b) if modifiers.contains(KeyModifiers::ALT) => vec![0x1b, b],
            Some(b) => vec![b],
            None => Vec::new(),
        },
        Char(c) => {
            let mut buf = [0u8; 4];
            let encoded = c.encode_utf8(&mut buf).as_bytes();
            if modifiers.contains(KeyModifiers::ALT) {
                // Alt sends ESC before the key
                let mut out = vec![0x1b];
                out.extend_from_slice(encoded);
                out
            } else {
                encoded.to_vec()
            }
        }
        Enter => vec![b'\r'],
        Tab => vec![b'\t'],
        BackTab => b"\x1b[Z".to_vec(),
        Backspace => vec![0x7f],
        Esc => vec![0x1b],
        Up => b"\x1b[A".to_vec(),
        Down => b"\x1b[B".to_vec(),
        Right => b"\x1b[C".to_vec(),
        Left => b"\x1b[D".to_vec(),
        Home => b"\x1b[H".to_vec(),
        End => b"\x1b[F".to_vec(),
        PageUp => b"\x1b[5~".to_vec(),
        PageDown => b"\x1b[6~".to_vec(),
        Delete => b"\x1b[3~".to_vec(),
        Insert => b"\x1b[2~".to_vec(),
        F(n) => match n {
            1 => b"\x1bOP".to_vec(),
            2 => b"\x1bOQ".to_vec(),
            3 => b"\x1bOR".to_vec(),
            4 => b"\x1bOS".to_vec(),
            5 => b"\x1b[15~".to_vec(),
            6 => b"\x1b[17~".to_vec(),
            7 => b"\x1b[18~".to_vec(),
            8 => b"\x1b[19~".to_vec(),
            9 => b"\x1b[20~".to_vec(),
            10 => b"\x1b[21~".to_vec(),
            11 => b"\x1b[23~".to_vec(),
            12 => b"\x1b[24~".to_vec(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Control code for Ctrl+`c`
fn control_byte(c: char) -> Option<u8> {
    match c.to_ascii_lowercase() {
        c @ 'a'..='z' => Some(c as u8 - b'a' + 1),
        '@' | ' ' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '7' | '/' => Some(0x1f),
        '?' | '8' => Some(0x7f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_characters() {
        assert_eq!(key_to_bytes(KeyCode::Char('a'), KeyModifiers::NONE), b"a");
        assert_eq!(key_to_bytes(KeyCode::Char('A'), KeyModifiers::SHIFT), b"A");
        assert_eq!(
            key_to_bytes(KeyCode::Char('é'), KeyModifiers::NONE),
            "é".as_bytes()
        );
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(key_to_bytes(KeyCode::Char('c'), KeyModifiers::CONTROL), [0x03]);
        assert_eq!(key_to_bytes(KeyCode::Char('D'), KeyModifiers::CONTROL), [0x04]);
        assert_eq!(key_to_bytes(KeyCode::Char('['), KeyModifiers::CONTROL), [0x1b]);
        assert_eq!(key_to_bytes(KeyCode::Char(' '), KeyModifiers::CONTROL), [0x00]);
        assert!(key_to_bytes(KeyCode::Char('1'), KeyModifiers::CONTROL).is_empty());
    }

    #[test]
    fn test_alt_prefixes_escape() {
        assert_eq!(key_to_bytes(KeyCode::Char('b'), KeyModifiers::ALT), b"\x1bb");
        assert_eq!(
            key_to_bytes(KeyCode::Char('x'), KeyModifiers::CONTROL | KeyModifiers::ALT),
            [0x1b, 0x18]
        );
    }

    #[test]
    fn test_special_keys() {
        assert_eq!(key_to_bytes(KeyCode::Enter, KeyModifiers::NONE), b"\r");
        assert_eq!(key_to_bytes(KeyCode::Backspace, KeyModifiers::NONE), [0x7f]);
        assert_eq!(key_to_bytes(KeyCode::Up, KeyModifiers::NONE), b"\x1b[A");
        assert_eq!(key_to_bytes(KeyCode::BackTab, KeyModifiers::SHIFT), b"\x1b[Z");
        assert_eq!(key_to_bytes(KeyCode::F(5), KeyModifiers::NONE), b"\x1b[15~");
        assert!(key_to_bytes(KeyCode::F(20), KeyModifiers::NONE).is_empty());
    }
}
