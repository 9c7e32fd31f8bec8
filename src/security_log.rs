//! Security event logging for audit trails.
//!
//! Authentication and host-key decisions are logged with `target: "security"`
//! so they can be filtered independently of the rest of the log:
//!
//! ```bash
//! RUST_LOG=security=info tether
//! ```

use tracing::{info, warn};

/// Log an SSH authentication attempt.
///
/// Called once per credential before it is offered to the server.
pub fn log_auth_attempt(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_attempt",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication attempt"
    );
}

pub fn log_auth_success(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_success",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication succeeded"
    );
}

pub fn log_auth_failure(host: &str, port: u16, username: &str, method: &str, reason: &str) {
    warn!(
        target: "security",
        event = "auth_failure",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        reason = %reason,
        "SSH authentication failed"
    );
}

/// Log a host key that matched the trust store.
pub fn log_host_key_accepted(host: &str, port: u16, fingerprint: &str) {
    info!(
        target: "security",
        event = "host_key_accepted",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        "Host key verified against trust store"
    );
}

/// Log a host key recorded on first use.
pub fn log_host_key_learned(host: &str, port: u16, fingerprint: &str) {
    warn!(
        target: "security",
        event = "host_key_learned",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        "Unknown host key added to trust store"
    );
}

pub fn log_host_key_rejected(host: &str, port: u16, fingerprint: &str, reason: &str) {
    warn!(
        target: "security",
        event = "host_key_rejected",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        reason = %reason,
        "Host key rejected"
    );
}

/// Log a connection that proceeds without host key verification.
pub fn log_verification_skipped(host: &str, port: u16, reason: &str) {
    warn!(
        target: "security",
        event = "verification_skipped",
        host = %host,
        port = port,
        reason = %reason,
        "Host key verification disabled for this connection"
    );
}
