//! One interactive SSH session from start to finish.
//!
//! Verifier and credentials are built first, the connection is established,
//! then the terminal enters raw mode, the shell starts and the signal relay is
//! armed. On the way out the session is closed, then the connection, then the
//! terminal is restored, on every path.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{SshSettings, TrustStoreFailure};
use crate::error::SshError;
use crate::relay::{SessionControl, ShutdownSignal, SignalRelay, SignalSources};
use crate::security_log;
use crate::ssh::auth::{CredentialOptions, CredentialSet};
use crate::ssh::client::{self, ConnectOptions, Connection};
use crate::ssh::known_hosts::HostVerifier;
use crate::ssh::session::{ExitReport, SessionIo, SessionOutcome, SshSession};
use crate::ssh::target::Target;
use crate::terminal::{HostTerminal, TerminalControl, TerminalStateGuard, WindowGeometry};

/// A started remote shell.
pub trait ShellSession: Send {
    type Control: SessionControl;

    fn control(&self) -> Self::Control;

    fn wait(&mut self) -> impl Future<Output = ExitReport> + Send;
}

/// Something that can start a shell and must be shut down afterwards.
pub trait ShellLauncher: Send + Sync {
    type Session: ShellSession;

    fn launch(
        &self,
        geometry: WindowGeometry,
    ) -> impl Future<Output = Result<Self::Session, SshError>> + Send;

    fn shutdown(self) -> impl Future<Output = ()> + Send;
}

/// An established connection plus the terminal type to request.
pub struct RemoteShell {
    connection: Connection,
    term: String,
}

impl RemoteShell {
    pub fn new(connection: Connection, term: impl Into<String>) -> Self {
        Self {
            connection,
            term: term.into(),
        }
    }
}

impl ShellLauncher for RemoteShell {
    type Session = SshSession;

    fn launch(
        &self,
        geometry: WindowGeometry,
    ) -> impl Future<Output = Result<SshSession, SshError>> + Send {
        self.connection
            .open_shell(&self.term, geometry, SessionIo::stdio())
    }

    fn shutdown(self) -> impl Future<Output = ()> + Send {
        async move { self.connection.close().await }
    }
}

/// Run a shell from `launcher` with `terminal` in raw mode.
///
/// `launcher` is shut down and the terminal restored however the session ends.
pub async fn drive<L, T>(
    launcher: L,
    terminal: Arc<T>,
    sources: SignalSources,
) -> Result<SessionOutcome, SshError>
where
    L: ShellLauncher,
    T: TerminalControl,
{
    let guard = match TerminalStateGuard::acquire(terminal.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            launcher.shutdown().await;
            return Err(e);
        }
    };

    let result = run_shell(&launcher, terminal, sources).await;
    launcher.shutdown().await;
    let restored = guard.restore();

    match (result, restored) {
        (Ok(outcome), Ok(())) => Ok(outcome),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_err)) => {
            tracing::warn!("Failed to restore terminal after error: {}", restore_err);
            Err(e)
        }
    }
}

async fn run_shell<L, T>(
    launcher: &L,
    terminal: Arc<T>,
    sources: SignalSources,
) -> Result<SessionOutcome, SshError>
where
    L: ShellLauncher,
    T: TerminalControl,
{
    let geometry = terminal.geometry();
    let mut session = launcher.launch(geometry).await?;

    let control = session.control();
    let relay = SignalRelay::arm(control.clone(), terminal, sources);

    let mut report = session.wait().await;
    control.close();
    report.closed_locally |= relay.termination_requested();
    relay.disarm();
    drop(session);

    tracing::info!(
        "Session ended (status {:?}, signal {:?}, closed locally: {})",
        report.exit_status,
        report.exit_signal,
        report.closed_locally
    );
    report.into_outcome()
}

/// Everything a connection attempt needs besides the target.
#[derive(Debug, Clone, Default)]
pub struct ConnectContext {
    pub settings: SshSettings,
    /// Identity named on the command line; beats any configured or per-host one
    pub identity_override: Option<PathBuf>,
}

impl ConnectContext {
    pub fn new(settings: SshSettings) -> Self {
        Self {
            settings,
            identity_override: None,
        }
    }

    pub fn with_identity_override(mut self, identity: Option<PathBuf>) -> Self {
        self.identity_override = identity;
        self
    }

    /// Copy of this context using `identity_file` when given.
    ///
    /// An identity override still takes precedence.
    pub fn with_identity(&self, identity_file: Option<PathBuf>) -> Self {
        let mut ctx = self.clone();
        if identity_file.is_some() {
            ctx.settings.identity_file = identity_file;
        }
        ctx
    }

    /// Load the trust store, applying the configured failure policy.
    pub fn host_verifier(&self, target: &Target) -> Result<HostVerifier, SshError> {
        let loaded = self
            .settings
            .known_hosts_path()
            .ok_or_else(|| SshError::TrustStore {
                path: PathBuf::from("~/.ssh/known_hosts"),
                reason: "could not determine home directory".to_string(),
            })
            .and_then(|path| HostVerifier::load(&path, self.settings.host_key_policy));

        match loaded {
            Ok(verifier) => Ok(verifier),
            Err(e @ SshError::TrustStore { .. })
                if self.settings.on_trust_store_error == TrustStoreFailure::SkipVerification =>
            {
                tracing::warn!("{}; continuing without host key verification", e);
                security_log::log_verification_skipped(&target.host, target.port, &e.to_string());
                Ok(HostVerifier::unverified())
            }
            Err(e) => Err(e),
        }
    }

    pub fn credential_options(&self) -> CredentialOptions {
        let identity = self
            .identity_override
            .clone()
            .or_else(|| self.settings.identity_path());
        CredentialOptions::new(self.settings.use_agent, identity)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::new(
            self.settings.connect_timeout_ms,
            self.settings.handshake_timeout_secs,
            self.settings.keepalive_interval_secs,
        )
    }
}

/// Connect to `target` and run an interactive shell on the local terminal.
///
/// Blocks until the remote shell exits or a termination signal closes it.
pub async fn ssh_connect(ctx: &ConnectContext, target: &Target) -> Result<SessionOutcome, SshError> {
    let verifier = Arc::new(ctx.host_verifier(target)?);
    let credentials = CredentialSet::discover(&ctx.credential_options()).await?;
    tracing::debug!("Credential order: {:?}", credentials.method_names());
    let terminal = Arc::new(HostTerminal::stdin().map_err(SshError::Terminal)?);

    let mut shutdown = ShutdownSignal::new().map_err(SshError::Terminal)?;
    let connection = establish_or_cancel(
        target,
        credentials,
        verifier,
        &ctx.connect_options(),
        &mut shutdown,
    )
    .await?;
    drop(shutdown);

    let sources = match SignalSources::os() {
        Ok(sources) => sources,
        Err(e) => {
            connection.close().await;
            return Err(SshError::Terminal(e));
        }
    };

    drive(
        RemoteShell::new(connection, ctx.settings.term.clone()),
        terminal,
        sources,
    )
    .await
}

/// [`client::establish`], abandoned with [`SshError::Cancelled`] if SIGINT or
/// SIGTERM arrives first.
pub async fn establish_or_cancel(
    target: &Target,
    credentials: CredentialSet,
    verifier: Arc<HostVerifier>,
    options: &ConnectOptions,
    shutdown: &mut ShutdownSignal,
) -> Result<Connection, SshError> {
    tokio::select! {
        result = client::establish(target, credentials, verifier, options) => result,
        () = shutdown.recv() => {
            tracing::info!("Connection to {} cancelled", target);
            Err(SshError::Cancelled {
                addr: target.address(),
            })
        }
    }
}
