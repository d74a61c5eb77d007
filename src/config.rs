use crate::duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Built-in silence requirement when neither the CLI nor the config file sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Top-level layout of the optional TOML config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub wait: WaitConfig,
}

/// The `[wait]` table. Every key is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct WaitConfig {
    /// Duration string, e.g. `"1.5s"`.
    pub timeout: Option<String>,
    pub command: Option<String>,
    pub verbose: Option<bool>,
}

/// Values supplied on the command line; `None` means "not given".
#[derive(Debug, Default)]
pub struct Overrides {
    pub timeout: Option<Duration>,
    pub command: Option<String>,
    pub verbose: bool,
}

/// Resolved, immutable settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Minimum continuous silence before the run is declared settled.
    pub timeout: Duration,
    /// Shell command whose stdout is monitored instead of our stdin.
    pub command: Option<String>,
    /// Pass the child's stderr through and log per-line progress.
    pub verbose: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The config file is not valid TOML for our layout.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// The timeout string is malformed.
    Duration(duration::ParseDurationError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Duration(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Duration(e) => Some(e),
        }
    }
}

/// Load the config file at `path`.
pub fn load(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

impl Settings {
    /// Merge CLI overrides over the file config over built-in defaults.
    ///
    /// A zero timeout is valid: the run settles at the first quiet instant.
    pub fn resolve(file: &WaitConfig, cli: Overrides) -> Result<Settings, ConfigError> {
        let timeout = match (cli.timeout, &file.timeout) {
            (Some(t), _) => t,
            (None, Some(s)) => duration::parse(s).map_err(ConfigError::Duration)?,
            (None, None) => DEFAULT_TIMEOUT,
        };

        let command = cli
            .command
            .or_else(|| file.command.clone())
            .filter(|c| !c.trim().is_empty());

        Ok(Settings {
            timeout,
            command,
            verbose: cli.verbose || file.verbose.unwrap_or(false),
        })
    }
}
