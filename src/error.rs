use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Network-layer classification of a failed dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialErrorKind {
    ConnectionRefused,
    HostUnreachable,
    Timeout,
    Unclassified,
}

impl fmt::Display for DialErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DialErrorKind::ConnectionRefused => "connection refused",
            DialErrorKind::HostUnreachable => "host unreachable",
            DialErrorKind::Timeout => "timed out",
            DialErrorKind::Unclassified => "connection failed",
        };
        f.write_str(label)
    }
}

/// SSH-related errors
#[derive(Error, Debug)]
pub enum SshError {
    #[error("Invalid target '{input}': {reason}")]
    InvalidTarget { input: String, reason: String },

    #[error("Trust store {}: {reason}", path.display())]
    TrustStore { path: PathBuf, reason: String },

    #[error("Host key for {host} is not trusted (offered {fingerprint})")]
    UntrustedHost { host: String, fingerprint: String },

    #[error("Host key for {host} has been revoked ({fingerprint})")]
    RevokedHostKey { host: String, fingerprint: String },

    #[error("Key file {}: {reason}", path.display())]
    KeyParse { path: PathBuf, reason: String },

    #[error("No authentication methods available (no reachable ssh-agent and no identity file)")]
    NoCredentials,

    #[error("Failed to connect to {addr}: {kind}: {reason}")]
    Dial {
        addr: String,
        kind: DialErrorKind,
        reason: String,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection to {addr} cancelled")]
    Cancelled { addr: String },

    #[error("SSH agent error: {0}")]
    Agent(String),

    #[error("Failed to create session: {0}")]
    SessionCreation(String),

    #[error("Request for pseudo terminal failed: {0}")]
    PtyRequest(String),

    #[error("Failed to start shell: {0}")]
    ShellStart(String),

    #[error("Remote shell exited with status {status}")]
    RemoteShell { status: u32 },

    #[error("Remote shell killed by signal {signal}")]
    RemoteSignal { signal: String },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Terminal error: {0}")]
    Terminal(#[source] std::io::Error),

    #[error("russh error: {0}")]
    Russh(String),
}

impl SshError {
    /// Dial failure kind, if this error came from the network layer.
    pub fn dial_kind(&self) -> Option<DialErrorKind> {
        match self {
            SshError::Dial { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Errors raised before any local terminal state was touched.
    ///
    /// The front end reports these and returns to the host list.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SshError::InvalidTarget { .. }
                | SshError::TrustStore { .. }
                | SshError::UntrustedHost { .. }
                | SshError::RevokedHostKey { .. }
                | SshError::KeyParse { .. }
                | SshError::NoCredentials
                | SshError::Dial { .. }
                | SshError::AuthenticationFailed(_)
                | SshError::Agent(_)
                | SshError::Cancelled { .. }
        )
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::Russh(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_error_message_names_kind_and_address() {
        let err = SshError::Dial {
            addr: "example.com:22".to_string(),
            kind: DialErrorKind::ConnectionRefused,
            reason: "os error 111".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("example.com:22"));
        assert!(msg.contains("connection refused"));
        assert_eq!(err.dial_kind(), Some(DialErrorKind::ConnectionRefused));
    }

    #[test]
    fn session_errors_are_not_recoverable_before_terminal() {
        assert!(!SshError::PtyRequest("denied".into()).is_recoverable());
        assert!(!SshError::RemoteShell { status: 1 }.is_recoverable());
        assert!(SshError::NoCredentials.is_recoverable());
        assert!(
            SshError::Cancelled {
                addr: "example.com:22".into()
            }
            .is_recoverable()
        );
        assert!(
            SshError::UntrustedHost {
                host: "example.com".into(),
                fingerprint: "SHA256:abc".into(),
            }
            .is_recoverable()
        );
    }

    #[test]
    fn trust_store_error_displays_path() {
        let err = SshError::TrustStore {
            path: PathBuf::from("/tmp/known_hosts"),
            reason: "line 3: missing key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Trust store /tmp/known_hosts: line 3: missing key"
        );
    }
}
