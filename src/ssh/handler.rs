use std::future::Future;
use std::sync::Arc;

use russh::client::Handler;
use russh::keys::PublicKey;

use crate::error::SshError;

use super::known_hosts::HostVerifier;

/// SSH client handler implementation
pub struct ClientHandler {
    host: String,
    port: u16,
    verifier: Arc<HostVerifier>,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, verifier: Arc<HostVerifier>) -> Self {
        Self {
            host,
            port,
            verifier,
        }
    }
}

impl Handler for ClientHandler {
    type Error = SshError;

    /// Rejecting here aborts the handshake before any credential is sent.
    ///
    /// Verification may append to the trust store, so it runs on the blocking pool.
    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let verifier = self.verifier.clone();
        let host = self.host.clone();
        let port = self.port;
        let key = server_public_key.clone();

        async move {
            tokio::task::spawn_blocking(move || {
                verifier.verify(&host, port, &key)?;
                tracing::debug!("Host key verified for {}:{}", host, port);
                Ok::<_, SshError>(true)
            })
            .await
            .map_err(|e| SshError::Russh(format!("host key check did not complete: {e}")))?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostKeyPolicy;
    use crate::ssh::known_hosts::TrustStore;
    use russh::keys;
    use std::path::Path;

    const KEY_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAICdaEBVyBV2u2CeGDgSIdeIfynTs3lUzN8JygMJZ+V9u";
    const KEY_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAILDZCckd3ZKy+NeAmReHYFqa7y9ZX6QUe+oaTNey7Nmx";

    fn handler() -> ClientHandler {
        let store = TrustStore::parse(
            Path::new("known_hosts"),
            &format!("example.com ssh-ed25519 {KEY_A}\n"),
        )
        .expect("store");
        ClientHandler::new(
            "example.com".to_string(),
            22,
            Arc::new(HostVerifier::from_trust_store(store, HostKeyPolicy::Strict)),
        )
    }

    #[tokio::test]
    async fn matching_key_is_accepted() {
        let key = keys::parse_public_key_base64(KEY_A).expect("key");
        assert!(handler().check_server_key(&key).await.expect("accepted"));
    }

    #[tokio::test]
    async fn differing_key_aborts_handshake() {
        let key = keys::parse_public_key_base64(KEY_B).expect("key");
        let err = handler().check_server_key(&key).await.unwrap_err();
        assert!(matches!(err, SshError::UntrustedHost { .. }));
    }

    #[tokio::test]
    async fn accept_new_records_key_from_handshake() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("known_hosts");
        let verifier = HostVerifier::load(&path, HostKeyPolicy::AcceptNew).expect("verifier");
        let mut handler = ClientHandler::new("example.com".to_string(), 2222, Arc::new(verifier));

        let key = keys::parse_public_key_base64(KEY_B).expect("key");
        assert!(handler.check_server_key(&key).await.expect("learned"));

        let store = TrustStore::load(&path).expect("written");
        assert_eq!(store.path(), path.as_path());
        assert_eq!(store.len(), 1);
    }
}
