//! Output formatting for the CLI
//!
//! Tables for hosts and remote directories, and colored status lines for
//! connection progress.

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use rt_core::config::HostProfile;
use rt_core::events::{LogEntry, LogLevel};
use rt_core::AuthKind;
use rt_orchestrator::RemoteEntry;

/// Host as shown to the user; credentials are never printed
#[derive(Debug, Clone, Serialize)]
pub struct HostSummary {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_key: Option<String>,
}

impl From<&HostProfile> for HostSummary {
    fn from(profile: &HostProfile) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            address: profile.address.clone(),
            port: profile.port,
            username: profile.username.clone(),
            auth: profile.auth.kind(),
            host_key: profile.host_key.clone(),
        }
    }
}

/// Format saved hosts as a table
pub fn format_hosts(hosts: &[HostSummary]) -> String {
    if hosts.is_empty() {
        return "No saved hosts".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "TARGET")]
        target: String,
        #[tabled(rename = "USER")]
        username: String,
        #[tabled(rename = "AUTH")]
        auth: String,
        #[tabled(rename = "ID")]
        id: String,
    }

    let rows: Vec<HostRow> = hosts
        .iter()
        .map(|h| HostRow {
            name: h.name.clone(),
            target: format!("{}:{}", h.address, h.port),
            username: h.username.clone(),
            auth: h.auth.as_str().replace('_', " "),
            id: truncate(&h.id, 8),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a remote directory listing as a table
pub fn format_entries(entries: &[RemoteEntry]) -> String {
    if entries.is_empty() {
        return "Empty directory".to_string();
    }

    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "MODE")]
        mode: String,
        #[tabled(rename = "SIZE")]
        size: String,
        #[tabled(rename = "NAME")]
        name: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow {
            mode: format!("{}{}", if e.is_dir() { 'd' } else { '-' }, e.permissions()),
            size: if e.is_dir() {
                "-".to_string()
            } else {
                format_bytes(e.size)
            },
            name: if e.is_dir() {
                format!("{}/", e.name)
            } else {
                e.name.clone()
            },
        })
        .collect();

    Table::new(rows).with(Style::blank()).to_string()
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a connection log line, colored by level
pub fn print_log(entry: &LogEntry) {
    let color = match entry.level {
        LogLevel::Info => Color::Cyan,
        LogLevel::Success => Color::Green,
        LogLevel::Warning => Color::Yellow,
        LogLevel::Error => Color::Red,
    };
    let icon = entry.icon.as_deref().unwrap_or("•");

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(color),
        Print(icon),
        Print(" "),
        ResetColor,
        Print(&entry.message),
        Print("\r\n")
    );
}

fn print_prefixed(to_stderr: bool, color: Color, prefix: &str, msg: &str) {
    if to_stderr {
        let _ = crossterm::execute!(
            std::io::stderr(),
            SetForegroundColor(color),
            Print(prefix),
            ResetColor,
            Print(msg),
            Print("\n")
        );
    } else {
        let _ = crossterm::execute!(
            std::io::stdout(),
            SetForegroundColor(color),
            Print(prefix),
            ResetColor,
            Print(msg),
            Print("\n")
        );
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_prefixed(false, Color::Green, "✓ ", msg);
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    print_prefixed(true, Color::Red, "✗ ", msg);
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    print_prefixed(true, Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    print_prefixed(false, Color::Cyan, "ℹ ", msg);
}
