//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use rt_core::config::{self, AppConfig};

fn resolve(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Load the application config.
///
/// An explicit path must exist and parse. The default path is optional and
/// falls back to defaults when missing or broken.
pub fn load_app_config(config_path: Option<&PathBuf>) -> Result<AppConfig> {
    if let Some(path) = config_path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if !default_path.exists() {
        tracing::debug!("No config at {:?}, using defaults", default_path);
        return Ok(AppConfig::default());
    }

    Ok(config::load_config(&default_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
        AppConfig::default()
    }))
}

/// Show the current configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Showing defaults. Run 'remotty config init' to create one");
        println!();
        println!("{}", toml::to_string_pretty(&AppConfig::default())?);
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Write a default configuration file
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    write_default(&path)?;
    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}

fn write_default(path: &Path) -> Result<()> {
    config::save_config(path, &AppConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        config_init(Some(&path), false).unwrap();
        assert!(path.exists());

        let loaded = load_app_config(Some(&path)).unwrap();
        assert_eq!(loaded.input_buffer, AppConfig::default().input_buffer);
    }

    #[test]
    fn test_init_keeps_existing_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "input_buffer = 8\n").unwrap();

        config_init(Some(&path), false).unwrap();
        assert_eq!(load_app_config(Some(&path)).unwrap().input_buffer, 8);

        config_init(Some(&path), true).unwrap();
        assert_eq!(load_app_config(Some(&path)).unwrap().input_buffer, 256);
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(load_app_config(Some(&path)).is_err());
    }
}
