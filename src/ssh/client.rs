use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use russh::Disconnect;
use russh::client::{self, Config};
use russh::keys::PublicKey;
use russh::keys::agent::client::AgentClient;
use tokio::net::{TcpStream, UnixStream};
use tokio::time::timeout;

use crate::error::{DialErrorKind, SshError};
use crate::security_log;
use crate::terminal::WindowGeometry;

use super::auth::{Credential, CredentialSet, rsa_hash_for};
use super::handler::ClientHandler;
use super::known_hosts::HostVerifier;
use super::session::{SessionIo, SshSession};
use super::target::Target;

/// Timeouts and keepalive for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Bound on the TCP dial alone
    pub connect_timeout: Duration,
    /// Bound on the SSH handshake plus authentication
    pub handshake_timeout: Duration,
    pub keepalive_interval: Option<Duration>,
}

impl ConnectOptions {
    pub fn new(connect_timeout_ms: u64, handshake_timeout_secs: u64, keepalive_secs: u64) -> Self {
        // Treat 0 as "no keepalive" to avoid immediate timeout
        let keepalive_interval = if keepalive_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(keepalive_secs))
        };
        Self {
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            handshake_timeout: Duration::from_secs(handshake_timeout_secs),
            keepalive_interval,
        }
    }

    /// The interactive session itself never times out.
    pub fn client_config(&self) -> Config {
        Config {
            inactivity_timeout: None,
            keepalive_interval: self.keepalive_interval,
            keepalive_max: 3,
            ..Default::default()
        }
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new(1000, 15, 60)
    }
}

/// An authenticated SSH transport. Closed at most once.
pub struct Connection {
    handle: client::Handle<ClientHandler>,
    target: Target,
    closed: AtomicBool,
}

impl Connection {
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Open a session channel with a PTY of `term` sized to `geometry` and start a shell.
    pub async fn open_shell(
        &self,
        term: &str,
        geometry: WindowGeometry,
        io: SessionIo,
    ) -> Result<SshSession, SshError> {
        SshSession::open(&self.handle, term, geometry, io).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Disconnect from the server. Later calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("Disconnect from {} failed: {}", self.target, e);
        }
        tracing::info!("Disconnected from {}", self.target);
    }
}

/// Dial `target`, verify its host key and authenticate.
///
/// No [`Connection`] exists unless every step succeeds.
pub async fn establish(
    target: &Target,
    credentials: CredentialSet,
    verifier: Arc<HostVerifier>,
    options: &ConnectOptions,
) -> Result<Connection, SshError> {
    let addr = target.address();
    tracing::info!("Connecting to {}", target);

    let stream = timeout(
        options.connect_timeout,
        TcpStream::connect((target.host.as_str(), target.port)),
    )
    .await
    .map_err(|_| SshError::Dial {
        addr: addr.clone(),
        kind: DialErrorKind::Timeout,
        reason: format!("no answer within {} ms", options.connect_timeout.as_millis()),
    })?
    .map_err(|e| SshError::Dial {
        addr: addr.clone(),
        kind: classify_io_error(&e),
        reason: e.to_string(),
    })?;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY: {}", e);
    }

    let handshake = async {
        let handler = ClientHandler::new(target.host.clone(), target.port, verifier);
        let mut handle = client::connect_stream(Arc::new(options.client_config()), stream, handler)
            .await
            .map_err(|e| handshake_error(&addr, e))?;

        if let Err(e) = authenticate(&mut handle, target, credentials).await {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(e);
        }
        Ok::<_, SshError>(handle)
    };

    let handle = timeout(options.handshake_timeout, handshake)
        .await
        .map_err(|_| SshError::Dial {
            addr: addr.clone(),
            kind: DialErrorKind::Timeout,
            reason: format!(
                "SSH handshake did not complete within {} s",
                options.handshake_timeout.as_secs()
            ),
        })??;

    tracing::info!("Authenticated to {}", target);
    Ok(Connection {
        handle,
        target: target.clone(),
        closed: AtomicBool::new(false),
    })
}

/// Transport-level russh failures are dial failures; verifier verdicts pass through.
fn handshake_error(addr: &str, err: SshError) -> SshError {
    match err {
        SshError::Russh(reason) => SshError::Dial {
            addr: addr.to_string(),
            kind: classify_message(&reason),
            reason,
        },
        other => other,
    }
}

async fn authenticate(
    handle: &mut client::Handle<ClientHandler>,
    target: &Target,
    credentials: CredentialSet,
) -> Result<(), SshError> {
    let attempts = credentials.len();

    for credential in credentials {
        let method = credential.method_name();
        security_log::log_auth_attempt(&target.host, target.port, &target.user, method);

        let accepted = match credential {
            Credential::Agent {
                mut agent,
                identities,
            } => authenticate_with_agent(handle, &target.user, &mut agent, identities).await,
            Credential::PrivateKey { path, key } => {
                tracing::debug!("Offering key {:?}", path);
                handle
                    .authenticate_publickey(&target.user, key)
                    .await
                    .map(|result| result.success())
                    .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
            }
        };

        if accepted {
            security_log::log_auth_success(&target.host, target.port, &target.user, method);
            return Ok(());
        }
        security_log::log_auth_failure(
            &target.host,
            target.port,
            &target.user,
            method,
            "rejected by server",
        );
    }

    Err(SshError::AuthenticationFailed(format!(
        "server rejected all {} authentication methods for {}",
        attempts, target.user
    )))
}

/// Try each agent identity in agent order.
async fn authenticate_with_agent(
    handle: &mut client::Handle<ClientHandler>,
    username: &str,
    agent: &mut AgentClient<UnixStream>,
    identities: Vec<PublicKey>,
) -> bool {
    for identity in identities {
        let hash_alg = rsa_hash_for(identity.algorithm().is_rsa());
        match handle
            .authenticate_publickey_with(username, identity, hash_alg, agent)
            .await
        {
            Ok(result) if result.success() => return true,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("Agent key failed: {}", e);
                continue;
            }
        }
    }
    false
}

/// Classify a socket error by kind, then OS code, then message.
pub fn classify_io_error(err: &std::io::Error) -> DialErrorKind {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::ConnectionRefused => return DialErrorKind::ConnectionRefused,
        ErrorKind::TimedOut => return DialErrorKind::Timeout,
        ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => {
            return DialErrorKind::HostUnreachable;
        }
        _ => {}
    }

    match err.raw_os_error() {
        Some(libc::ECONNREFUSED) => DialErrorKind::ConnectionRefused,
        Some(libc::EHOSTUNREACH) | Some(libc::ENETUNREACH) => DialErrorKind::HostUnreachable,
        Some(libc::ETIMEDOUT) => DialErrorKind::Timeout,
        _ => classify_message(&err.to_string()),
    }
}

/// Fallback classification by well-known error substrings.
pub fn classify_message(message: &str) -> DialErrorKind {
    let message = message.to_ascii_lowercase();
    if message.contains("connection refused") {
        DialErrorKind::ConnectionRefused
    } else if message.contains("no route to host")
        || message.contains("host unreachable")
        || message.contains("host is unreachable")
        || message.contains("network is unreachable")
        || message.contains("host is down")
    {
        DialErrorKind::HostUnreachable
    } else if message.contains("timed out")
        || message.contains("timeout")
        || message.contains("deadline exceeded")
    {
        DialErrorKind::Timeout
    } else {
        DialErrorKind::Unclassified
    }
}
