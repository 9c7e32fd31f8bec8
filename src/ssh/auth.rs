use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::agent::client::AgentClient;
use russh::keys::{HashAlg, PrivateKeyWithHashAlg, PublicKey};
use tokio::net::UnixStream;

use crate::config::paths;
use crate::error::SshError;

pub const AGENT_SOCKET_ENV: &str = "SSH_AUTH_SOCK";

/// A single way of proving our identity to the server.
pub enum Credential {
    /// Signing delegated to a running ssh-agent
    Agent {
        agent: AgentClient<UnixStream>,
        identities: Vec<PublicKey>,
    },
    /// A private key loaded from disk
    PrivateKey {
        path: PathBuf,
        key: PrivateKeyWithHashAlg,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Agent { identities, .. } => f
                .debug_struct("Agent")
                .field("identities", &identities.len())
                .finish(),
            Credential::PrivateKey { path, .. } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .field("key", &"[KEY]")
                .finish(),
        }
    }
}

impl Credential {
    pub fn method_name(&self) -> &'static str {
        match self {
            Credential::Agent { .. } => "agent",
            Credential::PrivateKey { .. } => "publickey",
        }
    }
}

/// Ordered, non-empty list of credentials. Order is attempt priority.
#[derive(Debug)]
pub struct CredentialSet {
    methods: Vec<Credential>,
}

impl CredentialSet {
    pub fn new(methods: Vec<Credential>) -> Result<Self, SshError> {
        if methods.is_empty() {
            return Err(SshError::NoCredentials);
        }
        Ok(Self { methods })
    }

    /// Query the agent and key files described by `options`.
    ///
    /// The agent comes first when reachable. An explicit identity file is
    /// always appended after it; default identities are only consulted when
    /// neither is available. Any key that exists but cannot be loaded is fatal.
    pub async fn discover(options: &CredentialOptions) -> Result<Self, SshError> {
        let mut methods = Vec::new();

        if options.use_agent {
            match &options.agent_socket {
                Some(socket) => {
                    if let Some(agent) = agent_credential_at(socket).await {
                        methods.push(agent);
                    }
                }
                None => tracing::debug!("{} not set, skipping ssh-agent", AGENT_SOCKET_ENV),
            }
        }

        match &options.identity_file {
            Some(path) => methods.push(load_private_key(path)?),
            None if methods.is_empty() => {
                if let Some(path) = options.default_identities.iter().find(|p| p.exists()) {
                    tracing::debug!("Falling back to default identity {:?}", path);
                    methods.push(load_private_key(path)?);
                }
            }
            None => {}
        }

        Self::new(methods)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn method_names(&self) -> Vec<&'static str> {
        self.methods.iter().map(Credential::method_name).collect()
    }
}

impl IntoIterator for CredentialSet {
    type Item = Credential;
    type IntoIter = std::vec::IntoIter<Credential>;

    fn into_iter(self) -> Self::IntoIter {
        self.methods.into_iter()
    }
}

/// Inputs to [`CredentialSet::discover`].
#[derive(Debug, Clone)]
pub struct CredentialOptions {
    pub use_agent: bool,
    pub agent_socket: Option<PathBuf>,
    pub identity_file: Option<PathBuf>,
    pub default_identities: Vec<PathBuf>,
}

impl CredentialOptions {
    pub fn new(use_agent: bool, identity_file: Option<PathBuf>) -> Self {
        Self {
            use_agent,
            agent_socket: agent_socket_from_env(),
            identity_file,
            default_identities: paths::default_identity_files(),
        }
    }
}

pub fn agent_socket_from_env() -> Option<PathBuf> {
    std::env::var_os(AGENT_SOCKET_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Connect to the agent at `socket` and list its identities.
///
/// An unreachable or empty agent contributes nothing.
pub async fn agent_credential_at(socket: &Path) -> Option<Credential> {
    let stream = match UnixStream::connect(socket).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!("ssh-agent at {:?} unreachable: {}", socket, e);
            return None;
        }
    };

    let mut agent = AgentClient::connect(stream);
    let identities = match agent.request_identities().await {
        Ok(identities) => identities,
        Err(e) => {
            tracing::warn!("Failed to list ssh-agent identities: {}", e);
            return None;
        }
    };

    if identities.is_empty() {
        tracing::debug!("ssh-agent holds no identities");
        return None;
    }

    tracing::debug!("ssh-agent offers {} identities", identities.len());
    Some(Credential::Agent { agent, identities })
}

/// Hash algorithm to sign with; only RSA keys take one.
pub(crate) fn rsa_hash_for(is_rsa: bool) -> Option<HashAlg> {
    if is_rsa { Some(HashAlg::Sha512) } else { None }
}

/// Load an unencrypted SSH private key from file
pub fn load_private_key(path: &Path) -> Result<Credential, SshError> {
    let key_error = |reason: String| SshError::KeyParse {
        path: path.to_path_buf(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| key_error(format!("cannot read: {e}")))?;

    let first_line = content.lines().next().unwrap_or("").trim();
    if first_line.starts_with("ssh-") || first_line.starts_with("ecdsa-") {
        return Err(key_error(
            "contains a public key, not a private key".to_string(),
        ));
    }
    if !first_line.starts_with("-----BEGIN") {
        return Err(key_error("not a PEM-encoded private key".to_string()));
    }

    let key = russh::keys::load_secret_key(path, None).map_err(|e| {
        let normalized = e.to_string().to_lowercase();
        if normalized.contains("encrypted") || normalized.contains("passphrase") {
            key_error("key is passphrase-protected; add it to ssh-agent instead".to_string())
        } else {
            key_error(format!("failed to parse: {e}"))
        }
    })?;

    let hash_alg = rsa_hash_for(key.algorithm().is_rsa());
    Ok(Credential::PrivateKey {
        path: path.to_path_buf(),
        key: PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
    })
}
