//! Command-line interface.
//!
//! # Responsibilities
//! - Parse arguments (clap derive)
//! - Edit the persisted configuration (`init`, `set-dest`, `set-dir`, `rm`)
//! - Start the proxy and keep it running until a signal arrives
//!
//! # Design Decisions
//! - Commands never talk to a running proxy; restart to apply changes
//! - Output goes to a caller-supplied writer so commands are testable

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::{ConfigError, ConfigManager};
use crate::lifecycle::StartupError;

#[derive(Debug, Parser)]
#[command(name = "devproxy")]
#[command(about = "Local development proxy: map dev hostnames to ports or folders", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Directory holding config.json (overrides the default search paths)
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create the config file if it doesn't exist and print its location
    Init,
    /// Print the config file
    Config,
    /// Map <host> to <dest>
    SetDest { host: String, dest: String },
    /// Serve files from <dir> for <host>
    SetDir { host: String, dir: PathBuf },
    /// Remove the mapping for <host>
    Rm { host: String },
    /// Print version
    Version,
    /// Run the proxy (default)
    Start,
}

impl Cli {
    /// Config manager honoring `--config-dir`.
    pub fn config_manager(&self) -> ConfigManager {
        match &self.config_dir {
            Some(dir) => ConfigManager::new(vec![dir.clone()]),
            None => ConfigManager::with_default_paths(),
        }
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Start)
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error("invalid host pattern {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("failed to parse dest url: {0}")]
    InvalidDestination(#[from] url::ParseError),

    #[error("no entry for host: {0}")]
    UnknownHost(String),

    #[error("no entries found in config.json; exiting")]
    NoEntries,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Run the parsed command, writing user-facing output to stdout.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let manager = cli.config_manager();
    let mut out = std::io::stdout();

    match cli.command() {
        Command::Init => commands::init(&manager, &mut out),
        Command::Config => commands::print_config(&manager, &mut out),
        Command::SetDest { host, dest } => commands::set_dest(&manager, &host, &dest, &mut out),
        Command::SetDir { host, dir } => commands::set_dir(&manager, &host, &dir, &mut out),
        Command::Rm { host } => commands::remove(&manager, &host, &mut out),
        Command::Version => commands::version(&mut out),
        Command::Start => commands::start(&manager, &mut out).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_default() {
        let cli = Cli::try_parse_from(["devproxy"]).unwrap();
        assert_eq!(cli.command(), Command::Start);
    }

    #[test]
    fn parses_set_dest_with_global_config_dir() {
        let cli = Cli::try_parse_from(["devproxy", "set-dest", "app.wip", "localhost:3000", "--config-dir", "/tmp/dp"])
            .unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/dp")));
        assert_eq!(
            cli.command(),
            Command::SetDest {
                host: "app.wip".into(),
                dest: "localhost:3000".into()
            }
        );
    }

    #[test]
    fn set_dest_requires_two_args() {
        assert!(Cli::try_parse_from(["devproxy", "set-dest", "app.wip"]).is_err());
    }
}
