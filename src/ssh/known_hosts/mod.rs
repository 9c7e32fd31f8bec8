use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use russh::keys::{self, HashAlg, PublicKey};

use crate::config::HostKeyPolicy;
use crate::error::SshError;
use crate::security_log;

mod matchers;
mod parse;

use parse::{Marker, TrustEntry};

/// Result of checking a host key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyStatus {
    /// Key matches a stored key for the host
    Known,
    /// No entry for the host
    Unknown {
        fingerprint: String,
        key_type: String,
    },
    /// Entries exist for the host but none match (potential MITM!)
    Changed {
        old_fingerprint: String,
        new_fingerprint: String,
        key_type: String,
    },
    /// Key matches a revoked entry
    Revoked { fingerprint: String },
}

/// An OpenSSH known_hosts file, parsed once per connection attempt.
#[derive(Debug, Clone)]
pub struct TrustStore {
    path: PathBuf,
    entries: Vec<TrustEntry>,
}

impl TrustStore {
    /// Load and parse the file. Missing, unreadable or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self, SshError> {
        let content = std::fs::read_to_string(path).map_err(|e| SshError::TrustStore {
            path: path.to_path_buf(),
            reason: if e.kind() == std::io::ErrorKind::NotFound {
                "file not found".to_string()
            } else {
                format!("unreadable: {e}")
            },
        })?;
        Self::parse(path, &content)
    }

    /// Like [`TrustStore::load`], but a missing file yields an empty store.
    pub fn load_or_empty(path: &Path) -> Result<Self, SshError> {
        if !path.exists() {
            tracing::debug!("Trust store {:?} does not exist yet", path);
            return Ok(Self {
                path: path.to_path_buf(),
                entries: Vec::new(),
            });
        }
        Self::load(path)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self, SshError> {
        let entries = parse::parse_entries(content).map_err(|reason| SshError::TrustStore {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::debug!("Loaded {} trust store entries from {:?}", entries.len(), path);
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the fingerprint of a public key
    pub fn fingerprint(key: &PublicKey) -> String {
        key.fingerprint(HashAlg::Sha256).to_string()
    }

    /// Check a presented host key; comparison is by SHA256 fingerprint.
    pub fn check(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyStatus {
        let host_port = matchers::host_port_key(host, port);
        let fingerprint = Self::fingerprint(key);
        let key_type = key.algorithm().as_str().to_string();

        let mut candidates = Vec::new();
        for entry in &self.entries {
            if !entry.patterns.matches(&host_port) {
                continue;
            }
            match entry.marker {
                Marker::Revoked => {
                    if Self::fingerprint(&entry.key) == fingerprint {
                        tracing::debug!("Key for {} revoked at line {}", host_port, entry.line);
                        return HostKeyStatus::Revoked { fingerprint };
                    }
                }
                Marker::CertAuthority => {}
                Marker::None => candidates.push(entry),
            }
        }

        if candidates.is_empty() {
            return HostKeyStatus::Unknown {
                fingerprint,
                key_type,
            };
        }

        if candidates
            .iter()
            .any(|entry| Self::fingerprint(&entry.key) == fingerprint)
        {
            return HostKeyStatus::Known;
        }

        let old = candidates
            .iter()
            .find(|entry| entry.key.algorithm() == key.algorithm())
            .unwrap_or(&candidates[0]);
        HostKeyStatus::Changed {
            old_fingerprint: Self::fingerprint(&old.key),
            new_fingerprint: fingerprint,
            key_type,
        }
    }

    /// Append a key for `host:port` to the file and to this store.
    pub fn learn(&mut self, host: &str, port: u16, key: &PublicKey) -> Result<(), SshError> {
        keys::known_hosts::learn_known_hosts_path(host, port, key, &self.path).map_err(|e| {
            SshError::TrustStore {
                path: self.path.clone(),
                reason: format!("failed to record host key: {e}"),
            }
        })?;

        let patterns = matchers::HostPatterns::parse(&matchers::host_port_key(host, port))
            .map_err(|reason| SshError::TrustStore {
                path: self.path.clone(),
                reason,
            })?;
        self.entries.push(TrustEntry {
            marker: Marker::None,
            patterns,
            key: key.clone(),
            line: 0,
        });
        Ok(())
    }
}

/// Decides whether a presented host key is acceptable.
pub struct HostVerifier {
    store: Option<Mutex<TrustStore>>,
    policy: HostKeyPolicy,
}

impl HostVerifier {
    pub fn from_trust_store(store: TrustStore, policy: HostKeyPolicy) -> Self {
        Self {
            store: Some(Mutex::new(store)),
            policy,
        }
    }

    /// Load the trust store at `path` according to `policy`.
    ///
    /// Under `accept-new` a missing file is an empty store that will be created
    /// on first use; under `strict` it is a `TrustStore` error.
    pub fn load(path: &Path, policy: HostKeyPolicy) -> Result<Self, SshError> {
        let store = match policy {
            HostKeyPolicy::Strict => TrustStore::load(path)?,
            HostKeyPolicy::AcceptNew => TrustStore::load_or_empty(path)?,
        };
        Ok(Self::from_trust_store(store, policy))
    }

    /// A verifier that accepts every key. Only built on explicit opt-in.
    pub fn unverified() -> Self {
        Self {
            store: None,
            policy: HostKeyPolicy::Strict,
        }
    }

    pub fn is_verifying(&self) -> bool {
        self.store.is_some()
    }

    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> Result<(), SshError> {
        let Some(store) = &self.store else {
            tracing::debug!("Accepting host key for {}:{} without verification", host, port);
            return Ok(());
        };

        let mut store = store.lock();
        let display_host = matchers::host_port_key(host, port);

        match store.check(host, port, key) {
            HostKeyStatus::Known => {
                security_log::log_host_key_accepted(host, port, &TrustStore::fingerprint(key));
                Ok(())
            }
            HostKeyStatus::Unknown { fingerprint, .. } => match self.policy {
                HostKeyPolicy::AcceptNew => {
                    store.learn(host, port, key)?;
                    security_log::log_host_key_learned(host, port, &fingerprint);
                    Ok(())
                }
                HostKeyPolicy::Strict => {
                    security_log::log_host_key_rejected(
                        host,
                        port,
                        &fingerprint,
                        "host not present in trust store",
                    );
                    Err(SshError::UntrustedHost {
                        host: display_host,
                        fingerprint,
                    })
                }
            },
            HostKeyStatus::Changed {
                old_fingerprint,
                new_fingerprint,
                ..
            } => {
                tracing::error!(
                    "HOST KEY FOR {} HAS CHANGED: expected {}, got {}",
                    display_host,
                    old_fingerprint,
                    new_fingerprint
                );
                security_log::log_host_key_rejected(
                    host,
                    port,
                    &new_fingerprint,
                    "key does not match trust store",
                );
                Err(SshError::UntrustedHost {
                    host: display_host,
                    fingerprint: new_fingerprint,
                })
            }
            HostKeyStatus::Revoked { fingerprint } => {
                security_log::log_host_key_rejected(host, port, &fingerprint, "key is revoked");
                Err(SshError::RevokedHostKey {
                    host: display_host,
                    fingerprint,
                })
            }
        }
    }
}
