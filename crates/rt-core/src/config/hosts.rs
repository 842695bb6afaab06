//! Saved host definitions (`hosts.toml`)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::time::current_time_millis;
use crate::types::{AuthMethod, ConnectOptions, SessionId, TerminalSize};

fn default_port() -> u16 {
    22
}

/// A saved remote host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProfile {
    /// Stable identifier
    pub id: String,

    /// Display name, unique within the book
    pub name: String,

    /// Host name or IP address
    pub address: String,

    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Remote user
    pub username: String,

    /// Pinned host key fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key: Option<String>,

    /// Creation time (Unix milliseconds)
    #[serde(default)]
    pub created_at: u64,

    /// Credentials, stored as given
    pub auth: AuthMethod,
}

impl HostProfile {
    /// Create a profile with a fresh id
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        auth: AuthMethod,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            address: address.into(),
            port,
            username: username.into(),
            host_key: None,
            created_at: current_time_millis(),
            auth,
        }
    }

    /// Connection options for a session to this host
    pub fn connect_options(&self, id: SessionId, size: TerminalSize) -> ConnectOptions {
        ConnectOptions {
            id,
            host: self.address.clone(),
            port: self.port,
            username: self.username.clone(),
            auth: self.auth.clone(),
            size,
            host_key: self.host_key.clone(),
        }
    }

    fn matches(&self, name_or_id: &str) -> bool {
        self.name == name_or_id || self.id == name_or_id
    }
}

/// Collection of saved hosts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostBook {
    #[serde(default)]
    hosts: Vec<HostProfile>,
}

impl HostBook {
    /// Load the book, starting empty when the file does not exist yet
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match super::load_config::<Self>(path) {
            Ok(book) => {
                tracing::debug!("Loaded {} hosts from {}", book.len(), path.display());
                Ok(book)
            }
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Write the book to disk
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        super::save_config(path, self)
    }

    /// Add a host; names must be unique
    pub fn add(&mut self, profile: HostProfile) -> Result<(), ConfigError> {
        if self.hosts.iter().any(|h| h.name == profile.name) {
            return Err(ConfigError::DuplicateHost(profile.name));
        }
        self.hosts.push(profile);
        Ok(())
    }

    /// Remove a host by name or id
    pub fn remove(&mut self, name_or_id: &str) -> Result<HostProfile, ConfigError> {
        let index = self
            .hosts
            .iter()
            .position(|h| h.matches(name_or_id))
            .ok_or_else(|| ConfigError::UnknownHost(name_or_id.to_string()))?;
        Ok(self.hosts.remove(index))
    }

    /// Find a host by name or id
    pub fn find(&self, name_or_id: &str) -> Option<&HostProfile> {
        self.hosts.iter().find(|h| h.matches(name_or_id))
    }

    /// Find a host or fail with [`ConfigError::UnknownHost`]
    pub fn require(&self, name_or_id: &str) -> Result<&HostProfile, ConfigError> {
        self.find(name_or_id)
            .ok_or_else(|| ConfigError::UnknownHost(name_or_id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostProfile> {
        self.hosts.iter()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
