//! Hotkey binding configuration
//!
//! Bindings live in `<config dir>/display-manager/config.json`
//! (e.g. ~/.config/display-manager/config.json). The file is created as `[]` on first
//! run and only ever read afterwards.

pub mod binding;
pub mod schema;

pub use binding::{Binding, KeyBinding, MonitorAction, VcpSetting};
pub use schema::Violation;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "display-manager";
const CONFIG_FILE_NAME: &str = "config.json";
const EMPTY_CONFIG: &str = "[]";

/// Errors from locating, reading or validating the config file
#[derive(Debug)]
pub enum ConfigError {
    /// The platform has no config directory
    NoConfigDir,
    /// The file could not be created, read, or parsed as JSON
    Unreadable { path: PathBuf, message: String },
    /// The file is JSON but does not describe a list of bindings
    Invalid {
        path: PathBuf,
        violations: Vec<Violation>,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NoConfigDir => write!(f, "Could not determine config directory"),
            ConfigError::Unreadable { path, message } => {
                write!(f, "Failed to read config {:?}: {}", path, message)
            }
            ConfigError::Invalid { path, violations } => {
                write!(f, "Invalid config {:?}:", path)?;
                for violation in violations {
                    write!(f, "\n  {}", violation)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Default location of the bindings file
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

fn unreadable(path: &Path, e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Unreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Create the config directory and an empty bindings file if they are missing.
/// Never touches an existing file. Returns true when the file was created.
pub fn ensure_config_file(path: &Path) -> Result<bool, ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| unreadable(parent, e))?;
        }
    }

    // create_new keeps a file that appears between the check and the write intact
    match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            log::info!("Writing new config file to {:?}", path);
            io::Write::write_all(&mut file, EMPTY_CONFIG.as_bytes())
                .map_err(|e| unreadable(path, e))?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(unreadable(path, e)),
    }
}

/// Read, parse and validate the bindings file
pub fn load(path: &Path) -> Result<Vec<Binding>, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| unreadable(path, e))?;
    parse(path, &contents)
}

/// Parse and validate bindings from a string; `path` is only used in errors
pub fn parse(path: &Path, contents: &str) -> Result<Vec<Binding>, ConfigError> {
    let document: serde_json::Value =
        serde_json::from_str(contents).map_err(|e| unreadable(path, e))?;

    schema::validate(&document).map_err(|violations| {
        for violation in &violations {
            log::error!("Config: {}", violation);
        }
        ConfigError::Invalid {
            path: path.to_path_buf(),
            violations,
        }
    })
}
