//! rt-cli: command-line interface for remotty
//!
//! Provides the `remotty` binary: interactive shells over the session
//! orchestrator, the saved host book, and SFTP file commands.

pub mod commands;
pub mod output;
