//! Host book commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{format_hosts, print_info, print_success, HostSummary};
use rt_core::config::{HostBook, HostProfile};
use rt_core::AuthMethod;

/// Arguments of `hosts add`
#[derive(Debug, Clone, Default)]
pub struct NewHost {
    pub name: String,
    pub address: String,
    pub port: u16,
    /// Defaults to the local user name
    pub username: Option<String>,
    pub password: Option<String>,
    /// Private key file, read and stored as text
    pub key: Option<PathBuf>,
    pub passphrase: Option<String>,
    /// Pinned `SHA256:` fingerprint
    pub host_key: Option<String>,
}

impl NewHost {
    fn auth(&self) -> Result<AuthMethod> {
        if let Some(key) = &self.key {
            let private_key = std::fs::read_to_string(key)
                .with_context(|| format!("Failed to read private key {:?}", key))?;
            return Ok(AuthMethod::PrivateKey {
                private_key,
                passphrase: self.passphrase.clone(),
            });
        }

        match &self.password {
            Some(password) => Ok(AuthMethod::Password {
                password: password.clone(),
            }),
            None => anyhow::bail!("Either --password or --key is required"),
        }
    }
}

/// List saved hosts
pub fn hosts_list(path: &Path, json: bool) -> Result<()> {
    let book = HostBook::load_or_default(path)
        .with_context(|| format!("Failed to load hosts from {:?}", path))?;
    let hosts: Vec<HostSummary> = book.iter().map(HostSummary::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&hosts)?);
    } else {
        println!("{}", format_hosts(&hosts));
    }
    Ok(())
}

/// Save a new host
pub fn hosts_add(path: &Path, host: NewHost) -> Result<()> {
    let mut book = HostBook::load_or_default(path)
        .with_context(|| format!("Failed to load hosts from {:?}", path))?;

    let username = host.username.clone().unwrap_or_else(whoami::username);
    let mut profile = HostProfile::new(
        host.name.clone(),
        host.address.clone(),
        host.port,
        username,
        host.auth()?,
    );
    profile.host_key = host.host_key.clone();

    let target = format!("{}@{}:{}", profile.username, profile.address, profile.port);
    book.add(profile)?;
    book.save(path)
        .with_context(|| format!("Failed to save hosts to {:?}", path))?;

    print_success(&format!("Added host '{}' ({})", host.name, target));
    Ok(())
}

/// Forget a saved host
pub fn hosts_remove(path: &Path, name: &str) -> Result<()> {
    let mut book = HostBook::load_or_default(path)
        .with_context(|| format!("Failed to load hosts from {:?}", path))?;

    let removed = book.remove(name)?;
    book.save(path)
        .with_context(|| format!("Failed to save hosts to {:?}", path))?;

    print_success(&format!("Removed host '{}'", removed.name));
    if book.is_empty() {
        print_info("No hosts left");
    }
    Ok(())
}
