//! Remote directory entries

use serde::{Deserialize, Serialize};

use rt_core::SessionError;

/// Kind of a remote file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    /// Full remote path
    pub path: String,
    pub kind: EntryKind,
    /// Size in bytes
    pub size: u64,
    /// Modification time (Unix seconds)
    pub modified: Option<u64>,
    /// Permission bits, e.g. `0o755`
    pub mode: u32,
}

impl RemoteEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// `rwxr-xr-x` rendering of [`mode`](Self::mode)
    pub fn permissions(&self) -> String {
        permission_string(self.mode)
    }
}

/// Render the owner/group/other bits of `mode` as `rwxrwxrwx`
pub fn permission_string(mode: u32) -> String {
    let mut out = String::with_capacity(9);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Parse an octal permission string such as `755` or `0644`
pub fn parse_mode(mode: &str) -> Result<u32, SessionError> {
    let digits = mode.trim().trim_start_matches("0o");
    if digits.is_empty() || digits.len() > 4 {
        return Err(SessionError::InvalidMode(mode.to_string()));
    }
    u32::from_str_radix(digits, 8).map_err(|_| SessionError::InvalidMode(mode.to_string()))
}

/// Join a remote directory and a name with `/`
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Directories first, then by name
pub fn sort_entries(entries: &mut [RemoteEntry]) {
    entries.sort_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.name.cmp(&b.name)));
}
