//! SSH client module for tether
//!
//! Provides host verification, authentication, connection and session management.

pub mod auth;
pub mod client;
pub mod handler;
pub mod known_hosts;
pub mod session;
pub mod target;

pub use auth::{Credential, CredentialOptions, CredentialSet};
pub use client::{ConnectOptions, Connection, establish};
pub use known_hosts::{HostKeyStatus, HostVerifier, TrustStore};
pub use session::{ExitReport, SessionHandle, SessionIo, SessionOutcome, SshSession};
pub use target::Target;
