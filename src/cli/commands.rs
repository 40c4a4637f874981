//! Command implementations.

use std::io::Write;
use std::path::Path;

use crate::backend::proxy::parse_destination;
use crate::cli::CliError;
use crate::config::{ConfigManager, Entry};
use crate::lifecycle::{self, signals};
use crate::routing::HostPattern;

/// `init`: create the default config unless one exists.
pub fn init(manager: &ConfigManager, out: &mut impl Write) -> Result<(), CliError> {
    let location = manager.ensure()?;
    if location.exists {
        writeln!(out, "found config file: {}", location.path.display())?;
    } else {
        writeln!(out, "created config.json file: {}", location.path.display())?;
    }
    Ok(())
}

/// `config`: print the file location and contents.
pub fn print_config(manager: &ConfigManager, out: &mut impl Write) -> Result<(), CliError> {
    let config = manager.ensure_and_load()?;
    let path = manager.locate()?.path;
    let json = serde_json::to_string_pretty(&config).map_err(crate::config::ConfigError::Serialize)?;
    writeln!(out, "found config {}:\n\n{json}", path.display())?;
    Ok(())
}

/// `set-dest`: map `host` to a backend host, replacing any existing entry.
pub fn set_dest(manager: &ConfigManager, host: &str, dest: &str, out: &mut impl Write) -> Result<(), CliError> {
    check_host(host)?;
    let dest = dest.trim();
    parse_destination(dest)?;

    let mut config = manager.ensure_and_load()?;
    match config.entry_mut(host) {
        Some(entry) => {
            writeln!(out, "replacing existing entry for {host}: {}", entry.destination())?;
            entry.dest = Some(dest.to_string());
            entry.dest_folder = None;
        }
        None => config.entries.push(Entry::host(host, dest)),
    }
    manager.write(&config)?;

    writeln!(out, "registered: {host} => {dest}")?;
    Ok(())
}

/// `set-dir`: serve `dir` (stored as an absolute path) for `host`.
pub fn set_dir(manager: &ConfigManager, host: &str, dir: &Path, out: &mut impl Write) -> Result<(), CliError> {
    check_host(host)?;
    let dir = std::path::absolute(dir)?;
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "Directory does not exist yet");
    }
    let dir = dir.display().to_string();

    let mut config = manager.ensure_and_load()?;
    match config.entry_mut(host) {
        Some(entry) => {
            writeln!(out, "replacing existing entry for {host}: {}", entry.destination())?;
            entry.dest = None;
            entry.dest_folder = Some(dir.clone());
        }
        None => config.entries.push(Entry::folder(host, &dir)),
    }
    manager.write(&config)?;

    writeln!(out, "registered: {host} => {dir}")?;
    Ok(())
}

/// `rm`: drop the entry for `host`.
pub fn remove(manager: &ConfigManager, host: &str, out: &mut impl Write) -> Result<(), CliError> {
    let mut config = manager.ensure_and_load()?;
    let before = config.entries.len();
    config.entries.retain(|e| e.host != host);
    if config.entries.len() == before {
        return Err(CliError::UnknownHost(host.to_string()));
    }
    manager.write(&config)?;

    writeln!(out, "removed: {host}")?;
    Ok(())
}

/// `version`.
pub fn version(out: &mut impl Write) -> Result<(), CliError> {
    writeln!(out, "devproxy {}", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

/// `start`: run the proxy until SIGINT or SIGTERM.
pub async fn start(manager: &ConfigManager, out: &mut impl Write) -> Result<(), CliError> {
    let location = manager.ensure()?;
    if !location.exists {
        writeln!(out, "created config.json file: {}", location.path.display())?;
    }
    let config = manager.load()?;
    if config.entries.is_empty() {
        return Err(CliError::NoEntries);
    }
    for entry in &config.entries {
        writeln!(out, "loaded: {} => {}", entry.host, entry.destination())?;
    }

    let running = lifecycle::start(&config).await?;
    writeln!(out, "listening: http://{}", running.http_addr())?;
    if let Some(addr) = running.https_addr() {
        writeln!(out, "listening: https://{addr}")?;
    }
    out.flush()?;

    signals::spawn_signal_handler(running.shutdown_handle());
    running.wait().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn check_host(host: &str) -> Result<(), CliError> {
    if host.trim().is_empty() {
        return Err(CliError::InvalidHost {
            host: host.to_string(),
            reason: "empty".to_string(),
        });
    }
    HostPattern::compile(host).map_err(|e| CliError::InvalidHost {
        host: host.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}
