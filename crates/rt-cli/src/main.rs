//! remotty CLI
//!
//! Interactive SSH shells, a saved host book and SFTP file commands, all
//! driven through the session orchestrator.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remotty::commands::{self, NewHost};
use remotty::output::print_error;

#[derive(Parser)]
#[command(name = "remotty")]
#[command(author, version, about = "Multi-session SSH shell and file-transfer client")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the saved hosts file
    #[arg(long, global = true, env = "REMOTTY_HOSTS")]
    hosts: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive shell on a saved host (Ctrl+] detaches)
    #[command(alias = "ssh")]
    Shell {
        /// Host name or id from the host book
        host: String,
    },

    /// Manage saved hosts
    Hosts {
        #[command(subcommand)]
        action: HostsAction,
    },

    /// List a remote directory
    Ls {
        host: String,
        /// Remote directory (login directory by default)
        path: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create a remote directory
    Mkdir { host: String, path: String },

    /// Delete a remote file or directory (recursively)
    Rm { host: String, path: String },

    /// Rename or move a remote path
    Mv {
        host: String,
        from: String,
        to: String,
    },

    /// Change permissions of a remote path
    Chmod {
        host: String,
        /// Octal mode, e.g. 755
        mode: String,
        path: String,
    },

    /// Download a remote file
    Get {
        host: String,
        remote: String,
        /// Local destination (current directory by default)
        local: Option<PathBuf>,
    },

    /// Upload a local file
    Put {
        host: String,
        local: PathBuf,
        /// Remote destination (login directory by default)
        remote: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum HostsAction {
    /// List saved hosts
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Save a new host
    Add(AddHost),
    /// Forget a saved host
    Remove {
        /// Host name or id
        name: String,
    },
}

#[derive(Args)]
struct AddHost {
    /// Unique display name
    name: String,
    /// Host name or IP address
    address: String,
    /// SSH port
    #[arg(short, long, default_value_t = 22)]
    port: u16,
    /// Remote user (defaults to the local user)
    #[arg(short, long)]
    user: Option<String>,
    /// Password credential
    #[arg(long, conflicts_with = "key")]
    password: Option<String>,
    /// Private key file
    #[arg(long)]
    key: Option<PathBuf>,
    /// Passphrase for the private key
    #[arg(long, requires = "key")]
    passphrase: Option<String>,
    /// Expected host key fingerprint (SHA256:...)
    #[arg(long)]
    host_key: Option<String>,
}

impl From<AddHost> for NewHost {
    fn from(args: AddHost) -> Self {
        Self {
            name: args.name,
            address: args.address,
            port: args.port,
            username: args.user,
            password: args.password,
            key: args.key,
            passphrase: args.passphrase,
            host_key: args.host_key,
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config directory path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(i32::try_from(code).unwrap_or(1)),
        Err(e) => {
            print_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<u32> {
    let config_path = cli.config.as_ref();

    if let Commands::Config { action } = &cli.command {
        match action {
            ConfigAction::Show => commands::config_show(config_path)?,
            ConfigAction::Path => {
                println!("{}", rt_core::config::default_config_dir().display());
            }
            ConfigAction::Init { force } => commands::config_init(config_path, *force)?,
        }
        return Ok(0);
    }

    let config = commands::load_app_config(config_path)?;
    let hosts = cli.hosts.clone().unwrap_or_else(|| config.hosts_path());
    let hosts: &Path = &hosts;

    match cli.command {
        Commands::Shell { host } => return commands::shell_command(config, hosts, &host).await,

        Commands::Hosts { action } => match action {
            HostsAction::List { json } => commands::hosts_list(hosts, json)?,
            HostsAction::Add(args) => commands::hosts_add(hosts, args.into())?,
            HostsAction::Remove { name } => commands::hosts_remove(hosts, &name)?,
        },

        Commands::Ls { host, path, json } => {
            commands::files_ls(&config, hosts, &host, path.as_deref(), json).await?
        }
        Commands::Mkdir { host, path } => commands::files_mkdir(&config, hosts, &host, &path).await?,
        Commands::Rm { host, path } => commands::files_rm(&config, hosts, &host, &path).await?,
        Commands::Mv { host, from, to } => {
            commands::files_mv(&config, hosts, &host, &from, &to).await?
        }
        Commands::Chmod { host, mode, path } => {
            commands::files_chmod(&config, hosts, &host, &mode, &path).await?
        }
        Commands::Get {
            host,
            remote,
            local,
        } => commands::files_get(&config, hosts, &host, &remote, local).await?,
        Commands::Put {
            host,
            local,
            remote,
        } => commands::files_put(&config, hosts, &host, &local, remote.as_deref()).await?,

        Commands::Config { .. } => {}
    }

    Ok(0)
}
