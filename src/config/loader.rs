//! Configuration discovery, loading and persistence.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ProxyConfig;
use crate::config::validation::ValidationError;

/// Name of the configuration file inside a config directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

const APP_DIR_NAME: &str = "devproxy";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, serde_json::Error),
    Serialize(serde_json::Error),
    Validation(Vec<ValidationError>),
    NoSearchPath,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "IO error on {}: {}", path.display(), e),
            ConfigError::Parse(path, e) => write!(f, "Parse error in {}: {}", path.display(), e),
            ConfigError::Serialize(e) => write!(f, "Failed to serialize config: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            ConfigError::NoSearchPath => write!(f, "No configuration directory could be determined"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(_, e) => Some(e),
            ConfigError::Parse(_, e) | ConfigError::Serialize(e) => Some(e),
            _ => None,
        }
    }
}

/// Where the configuration file lives, and whether it exists yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    pub dir: PathBuf,
    pub exists: bool,
}

/// Finds, reads and writes `config.json` across an ordered list of directories.
///
/// The first directory that already holds a config file wins. When none does,
/// the first directory is where a new file gets created.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    search_paths: Vec<PathBuf>,
}

impl ConfigManager {
    /// Create a manager over explicit search directories.
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Manager over the platform's default config directories.
    pub fn with_default_paths() -> Self {
        Self::new(default_search_paths())
    }

    /// Ordered directories searched for `config.json`.
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Resolve the config file location.
    pub fn locate(&self) -> Result<ConfigLocation, ConfigError> {
        let existing = self
            .search_paths
            .iter()
            .find(|dir| dir.join(CONFIG_FILE_NAME).is_file());

        let dir = match existing {
            Some(dir) => dir,
            None => self.search_paths.first().ok_or(ConfigError::NoSearchPath)?,
        };

        Ok(ConfigLocation {
            path: dir.join(CONFIG_FILE_NAME),
            dir: dir.clone(),
            exists: existing.is_some(),
        })
    }

    /// Load the config from the resolved location.
    pub fn load(&self) -> Result<ProxyConfig, ConfigError> {
        load_config(&self.locate()?.path)
    }

    /// Persist `config` to the resolved location, creating the directory.
    pub fn write(&self, config: &ProxyConfig) -> Result<PathBuf, ConfigError> {
        let location = self.locate()?;
        write_config(&location.path, config)?;
        Ok(location.path)
    }

    /// Create the default config if none exists. Returns the location as it
    /// was before the call, so callers can tell whether a file was created.
    pub fn ensure(&self) -> Result<ConfigLocation, ConfigError> {
        let location = self.locate()?;
        if !location.exists {
            write_config(&location.path, &ProxyConfig::default())?;
            tracing::debug!(path = %location.path.display(), "Created default config");
        }
        Ok(location)
    }

    /// Create the default config if missing, then load it.
    pub fn ensure_and_load(&self) -> Result<ProxyConfig, ConfigError> {
        let location = self.ensure()?;
        load_config(&location.path)
    }
}

/// Read and parse a JSON config file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    serde_json::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Write a config file as pretty-printed JSON.
pub fn write_config(path: &Path, config: &ProxyConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| ConfigError::Io(dir.to_path_buf(), e))?;
    }
    let mut json = serde_json::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    json.push('\n');
    fs::write(path, json).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
}

/// `$XDG_CONFIG_HOME/devproxy`, `~/.config/devproxy`, then the platform
/// config directory, without duplicates.
///
/// Under `sudo`, `~` is the invoking user's home and the platform directory
/// (which would be root's) is skipped.
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        paths.push(PathBuf::from(xdg).join(APP_DIR_NAME));
    }

    let sudo_uid = std::env::var("SUDO_UID").ok().filter(|v| !v.is_empty());
    match sudo_uid.as_deref().and_then(home_of_uid) {
        Some(home) => paths.push(home.join(".config").join(APP_DIR_NAME)),
        None => {
            if let Some(base) = directories::BaseDirs::new() {
                paths.push(base.home_dir().join(".config").join(APP_DIR_NAME));
            }
            if let Some(project) = directories::ProjectDirs::from("", "", APP_DIR_NAME) {
                paths.push(project.config_dir().to_path_buf());
            }
        }
    }

    let mut unique = Vec::with_capacity(paths.len());
    for path in paths {
        if !unique.contains(&path) {
            unique.push(path);
        }
    }
    unique
}

/// Home directory of the account with numeric id `uid`.
#[cfg(unix)]
fn home_of_uid(uid: &str) -> Option<PathBuf> {
    let uid = nix::unistd::Uid::from_raw(uid.parse().ok()?);
    match nix::unistd::User::from_uid(uid) {
        Ok(user) => user.map(|u| u.dir),
        Err(e) => {
            tracing::warn!(uid = %uid, error = %e, "Could not look up invoking user");
            None
        }
    }
}

#[cfg(not(unix))]
fn home_of_uid(_uid: &str) -> Option<PathBuf> {
    None
}
