use std::str::FromStr;
use std::time::Duration;
use std::{fs, path::PathBuf};

use common::store::{create_private_dir, CredentialStore, StoreError};
use serde::{Deserialize, Serialize};

use crate::trust_file::TrustFile;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const TRUST_FILE_NAME: &str = "trusted_peers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Address the client dials
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Seconds a TLS handshake may take before it is aborted (0 disables the limit)
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Upper bound on connections the server handles at once
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Default log level, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily-rolling log files (stdout only if not set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:12345".to_string()
}

fn default_server_addr() -> String {
    "localhost:12345".to_string()
}

fn default_handshake_timeout_secs() -> u64 {
    30
}

fn default_max_connections() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            server_addr: default_server_addr(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            max_connections: default_max_connections(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn handshake_timeout(&self) -> Option<Duration> {
        match self.handshake_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the ffsend directory (~/.ffsend)
    pub ffsend_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Path to the pinned peers file
    pub trust_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Load state from the ffsend directory.
    ///
    /// Neither the directory nor the config file has to exist; every
    /// missing setting takes its default.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let ffsend_dir = CredentialStore::at(custom_path)?.dir().to_path_buf();
        let config_path = ffsend_dir.join(CONFIG_FILE_NAME);
        let trust_path = ffsend_dir.join(TRUST_FILE_NAME);

        let config = match fs::read_to_string(&config_path) {
            Ok(config_toml) => toml::from_str(&config_toml)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            ffsend_dir,
            config_path,
            trust_path,
            config,
        })
    }

    /// Write the current config to disk unless a config file already exists.
    /// Returns whether a file was written.
    pub fn write_default_config(&self) -> Result<bool, StateError> {
        if self.config_path.exists() {
            return Ok(false);
        }

        create_private_dir(&self.ffsend_dir)?;
        let config_toml = toml::to_string_pretty(&self.config)?;
        fs::write(&self.config_path, config_toml)?;
        Ok(true)
    }

    pub fn store(&self) -> CredentialStore {
        CredentialStore::new(&self.ffsend_dir)
    }

    pub fn trust_file(&self) -> TrustFile {
        TrustFile::new(&self.trust_path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid log level '{0}' (expected one of trace, debug, info, warn, error)")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
