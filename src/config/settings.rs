use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Application-wide settings stored in config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub ssh: SshSettings,
    #[serde(default)]
    pub hosts: HostsSettings,
}

impl AppConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults; nothing is written back.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match super::paths::config_file() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_handshake_timeout() -> u64 {
    15
}

fn default_keepalive() -> u64 {
    60
}

fn default_term() -> String {
    "xterm-256color".to_string()
}

fn default_true() -> bool {
    true
}

/// What to do with a host key that the trust store does not already list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    #[default]
    Strict,
    AcceptNew,
}

/// What to do when the trust store cannot be loaded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TrustStoreFailure {
    #[default]
    Abort,
    SkipVerification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// Zero disables keepalives.
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_term")]
    pub term: String,
    #[serde(default = "default_true")]
    pub use_agent: bool,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    #[serde(default)]
    pub on_trust_store_error: TrustStoreFailure,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            handshake_timeout_secs: default_handshake_timeout(),
            keepalive_interval_secs: default_keepalive(),
            term: default_term(),
            use_agent: true,
            identity_file: None,
            known_hosts: None,
            host_key_policy: HostKeyPolicy::default(),
            on_trust_store_error: TrustStoreFailure::default(),
        }
    }
}

impl SshSettings {
    /// Trust store location with `~/` expanded.
    pub fn known_hosts_path(&self) -> Option<PathBuf> {
        match &self.known_hosts {
            Some(path) => Some(expand(path)),
            None => super::paths::ssh_known_hosts_file(),
        }
    }

    pub fn identity_path(&self) -> Option<PathBuf> {
        self.identity_file.as_deref().map(expand)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostsSettings {
    #[serde(default)]
    pub ssh_config: Option<PathBuf>,
}

impl HostsSettings {
    pub fn ssh_config_path(&self) -> Option<PathBuf> {
        match &self.ssh_config {
            Some(path) => Some(expand(path)),
            None => super::paths::ssh_config_file(),
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => super::paths::expand_tilde(raw),
        None => path.to_path_buf(),
    }
}
