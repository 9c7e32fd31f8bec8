use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Pty};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Notify, mpsc, oneshot};

use crate::error::SshError;
use crate::relay::SessionControl;
use crate::runner::ShellSession;
use crate::terminal::WindowGeometry;
use crate::terminal::stdin::StdinReader;

use super::handler::ClientHandler;

/// PTY modes: local echo on, control-character echo off, 14400 baud.
pub const TERMINAL_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 1),
    (Pty::ECHOCTL, 0),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
];

const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Commands that can be sent to the channel task
enum ChannelCommand {
    WindowChange { cols: u32, rows: u32 },
}

/// How the remote side (or we) ended the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitReport {
    pub exit_status: Option<u32>,
    pub exit_signal: Option<String>,
    pub closed_locally: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Remote shell exited with status 0
    Exited,
    /// Closed by us, normally on SIGINT/SIGTERM
    Terminated,
    /// Channel closed without an exit status
    Disconnected,
}

impl ExitReport {
    pub fn into_outcome(self) -> Result<SessionOutcome, SshError> {
        if self.closed_locally {
            return Ok(SessionOutcome::Terminated);
        }
        if let Some(signal) = self.exit_signal {
            return Err(SshError::RemoteSignal { signal });
        }
        match self.exit_status {
            Some(0) => Ok(SessionOutcome::Exited),
            Some(status) => Err(SshError::RemoteShell { status }),
            None => {
                tracing::warn!("Channel closed without an exit status");
                Ok(SessionOutcome::Disconnected)
            }
        }
    }
}

/// Where the channel reads input from and writes output to.
pub struct SessionIo {
    input: Option<mpsc::Receiver<Vec<u8>>>,
    output: Pin<Box<dyn AsyncWrite + Send>>,
    errors: Pin<Box<dyn AsyncWrite + Send>>,
    reader: Option<StdinReader>,
}

impl SessionIo {
    pub fn new(
        input: mpsc::Receiver<Vec<u8>>,
        output: impl AsyncWrite + Send + 'static,
        errors: impl AsyncWrite + Send + 'static,
    ) -> Self {
        Self {
            input: Some(input),
            output: Box::pin(output),
            errors: Box::pin(errors),
            reader: None,
        }
    }

    /// Wire the process's stdin, stdout and stderr.
    pub fn stdio() -> Self {
        let (reader, input) = StdinReader::spawn();
        Self {
            input: Some(input),
            output: Box::pin(tokio::io::stdout()),
            errors: Box::pin(tokio::io::stderr()),
            reader: Some(reader),
        }
    }
}

/// Cloneable control handle for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<ChannelCommand>,
    closed: Arc<AtomicBool>,
    close_notify: Arc<Notify>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SessionHandle {
    /// Close the session. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.close_notify.notify_one();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Push new geometry to the remote PTY. A no-op once closed.
    pub async fn window_change(&self, geometry: WindowGeometry) -> Result<(), SshError> {
        if self.is_closed() {
            return Ok(());
        }
        self.command_tx
            .send(ChannelCommand::WindowChange {
                cols: u32::from(geometry.cols),
                rows: u32::from(geometry.rows),
            })
            .await
            .map_err(|e| {
                tracing::debug!("SSH window change failed: {}", e);
                SshError::Channel(e.to_string())
            })
    }
}

impl SessionControl for SessionHandle {
    fn window_change(
        &self,
        geometry: WindowGeometry,
    ) -> impl Future<Output = Result<(), SshError>> + Send {
        SessionHandle::window_change(self, geometry)
    }

    fn close(&self) -> bool {
        SessionHandle::close(self)
    }

    fn is_closed(&self) -> bool {
        SessionHandle::is_closed(self)
    }
}

/// Interactive shell running on a PTY channel
pub struct SshSession {
    control: SessionHandle,
    exit_rx: Option<oneshot::Receiver<ExitReport>>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("control", &self.control)
            .finish()
    }
}

impl SshSession {
    /// Open a session channel, request a PTY, start a shell and spawn the I/O task.
    pub async fn open(
        handle: &Handle<ClientHandler>,
        term: &str,
        geometry: WindowGeometry,
        io: SessionIo,
    ) -> Result<Self, SshError> {
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::SessionCreation(e.to_string()))?;

        let pending = match negotiate(&mut channel, term, geometry).await {
            Ok(pending) => pending,
            Err(e) => {
                let _ = channel.close().await;
                return Err(e);
            }
        };
        tracing::info!("Shell started ({} {}x{})", term, geometry.cols, geometry.rows);

        let (command_tx, command_rx) = mpsc::channel::<ChannelCommand>(16);
        let (exit_tx, exit_rx) = oneshot::channel();
        let control = SessionHandle {
            command_tx,
            closed: Arc::new(AtomicBool::new(false)),
            close_notify: Arc::new(Notify::new()),
        };

        tokio::spawn(pump(
            channel,
            pending,
            io,
            command_rx,
            control.clone(),
            exit_tx,
        ));

        Ok(Self {
            control,
            exit_rx: Some(exit_rx),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.control.clone()
    }

    /// Wait for the remote shell to finish or for a local close.
    pub async fn wait(&mut self) -> ExitReport {
        let Some(exit_rx) = self.exit_rx.take() else {
            return ExitReport {
                closed_locally: self.control.is_closed(),
                ..ExitReport::default()
            };
        };
        match exit_rx.await {
            Ok(report) => report,
            Err(_) => {
                tracing::warn!("Session I/O task ended without a report");
                ExitReport {
                    closed_locally: self.control.is_closed(),
                    ..ExitReport::default()
                }
            }
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.control.close();
    }
}

impl ShellSession for SshSession {
    type Control = SessionHandle;

    fn control(&self) -> SessionHandle {
        self.handle()
    }

    fn wait(&mut self) -> impl Future<Output = ExitReport> + Send {
        SshSession::wait(self)
    }
}

/// PTY and shell requests, each waiting for the server's reply.
///
/// Returns any channel messages that arrived ahead of the replies.
async fn negotiate(
    channel: &mut Channel<Msg>,
    term: &str,
    geometry: WindowGeometry,
) -> Result<Vec<ChannelMsg>, SshError> {
    let mut pending = Vec::new();

    channel
        .request_pty(
            true,
            term,
            u32::from(geometry.cols),
            u32::from(geometry.rows),
            0,
            0,
            TERMINAL_MODES,
        )
        .await
        .map_err(|e| SshError::PtyRequest(e.to_string()))?;
    expect_reply(channel, &mut pending)
        .await
        .map_err(SshError::PtyRequest)?;

    channel
        .request_shell(true)
        .await
        .map_err(|e| SshError::ShellStart(e.to_string()))?;
    expect_reply(channel, &mut pending)
        .await
        .map_err(SshError::ShellStart)?;

    Ok(pending)
}

async fn expect_reply(
    channel: &mut Channel<Msg>,
    pending: &mut Vec<ChannelMsg>,
) -> Result<(), String> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => return Err("rejected by server".to_string()),
            Some(ChannelMsg::Close) | None => {
                return Err("channel closed before reply".to_string());
            }
            Some(msg) => pending.push(msg),
        }
    }
}

async fn next_input(input: &mut Option<mpsc::Receiver<Vec<u8>>>) -> Option<Vec<u8>> {
    match input {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Tracks what the remote side has told us about its exit.
#[derive(Default)]
struct ExitState {
    exit_status: Option<u32>,
    exit_signal: Option<String>,
}

enum Flow {
    Continue,
    Finished,
}

/// Sole owner of the channel for the session's lifetime.
async fn pump(
    mut channel: Channel<Msg>,
    pending: Vec<ChannelMsg>,
    mut io: SessionIo,
    mut command_rx: mpsc::Receiver<ChannelCommand>,
    control: SessionHandle,
    exit_tx: oneshot::Sender<ExitReport>,
) {
    let mut state = ExitState::default();
    let mut finished = false;

    for msg in pending {
        if let Flow::Finished = handle_message(Some(msg), &mut io, &mut state).await {
            finished = true;
            break;
        }
    }

    while !finished {
        tokio::select! {
            _ = control.close_notify.notified() => {
                tracing::debug!("Closing channel on local request");
                let _ = channel.eof().await;
                let _ = channel.close().await;
                finished = true;
            }
            msg = channel.wait() => {
                if let Flow::Finished = handle_message(msg, &mut io, &mut state).await {
                    finished = true;
                }
            }
            data = next_input(&mut io.input), if io.input.is_some() => {
                match data {
                    Some(bytes) => {
                        if let Err(e) = channel.data(&bytes[..]).await {
                            tracing::error!("Failed to send data: {}", e);
                        }
                    }
                    None => {
                        tracing::debug!("Local input closed, sending EOF");
                        io.input = None;
                        let _ = channel.eof().await;
                    }
                }
            }
            Some(cmd) = command_rx.recv() => {
                match cmd {
                    ChannelCommand::WindowChange { cols, rows } => {
                        tracing::debug!("Window change {}x{}", cols, rows);
                        if let Err(e) = channel.window_change(cols, rows, 0, 0).await {
                            tracing::error!("Failed to send window change: {}", e);
                        }
                    }
                }
            }
        }
    }

    // Stop the stdin reader before the terminal is handed back.
    io.input = None;
    drop(io.reader.take());
    let _ = io.output.flush().await;

    let closed_locally = control.closed.swap(true, Ordering::SeqCst);
    let _ = exit_tx.send(ExitReport {
        exit_status: state.exit_status,
        exit_signal: state.exit_signal,
        closed_locally,
    });
}

async fn handle_message(msg: Option<ChannelMsg>, io: &mut SessionIo, state: &mut ExitState) -> Flow {
    match msg {
        Some(ChannelMsg::Data { data }) => {
            if let Err(e) = write_flush(&mut io.output, &data).await {
                tracing::error!("Failed to write remote output: {}", e);
            }
        }
        Some(ChannelMsg::ExtendedData { data, ext }) => {
            let sink = if ext == SSH_EXTENDED_DATA_STDERR {
                &mut io.errors
            } else {
                &mut io.output
            };
            if let Err(e) = write_flush(sink, &data).await {
                tracing::error!("Failed to write remote stderr: {}", e);
            }
        }
        Some(ChannelMsg::ExitStatus { exit_status }) => {
            tracing::debug!("Exit status: {}", exit_status);
            state.exit_status = Some(exit_status);
        }
        Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
            tracing::debug!("Exit signal: {:?}", signal_name);
            state.exit_signal = Some(format!("{:?}", signal_name));
        }
        Some(ChannelMsg::Eof) => tracing::debug!("Remote sent EOF"),
        Some(ChannelMsg::Close) | None => return Flow::Finished,
        Some(_) => {}
    }
    Flow::Continue
}

async fn write_flush(sink: &mut Pin<Box<dyn AsyncWrite + Send>>, data: &[u8]) -> std::io::Result<()> {
    sink.write_all(data).await?;
    sink.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_modes_enable_echo_at_14400_baud() {
        assert!(TERMINAL_MODES.contains(&(Pty::ECHO, 1)));
        assert!(TERMINAL_MODES.contains(&(Pty::ECHOCTL, 0)));
        assert!(TERMINAL_MODES.contains(&(Pty::TTY_OP_ISPEED, 14400)));
        assert!(TERMINAL_MODES.contains(&(Pty::TTY_OP_OSPEED, 14400)));
    }

    #[test]
    fn outcome_mapping() {
        let report = |status: Option<u32>, signal: Option<&str>, local: bool| ExitReport {
            exit_status: status,
            exit_signal: signal.map(str::to_string),
            closed_locally: local,
        };

        assert_eq!(
            report(Some(0), None, false).into_outcome().unwrap(),
            SessionOutcome::Exited
        );
        assert_eq!(
            report(None, None, true).into_outcome().unwrap(),
            SessionOutcome::Terminated
        );
        assert_eq!(
            report(Some(1), None, true).into_outcome().unwrap(),
            SessionOutcome::Terminated
        );
        assert_eq!(
            report(None, None, false).into_outcome().unwrap(),
            SessionOutcome::Disconnected
        );
        assert!(matches!(
            report(Some(130), None, false).into_outcome(),
            Err(SshError::RemoteShell { status: 130 })
        ));
        assert!(matches!(
            report(None, Some("KILL"), false).into_outcome(),
            Err(SshError::RemoteSignal { .. })
        ));
    }

    fn handle() -> (SessionHandle, mpsc::Receiver<ChannelCommand>) {
        let (command_tx, command_rx) = mpsc::channel(4);
        (
            SessionHandle {
                command_tx,
                closed: Arc::new(AtomicBool::new(false)),
                close_notify: Arc::new(Notify::new()),
            },
            command_rx,
        )
    }

    #[tokio::test]
    async fn close_is_idempotent_across_clones() {
        let (control, _rx) = handle();
        let other = control.clone();
        assert!(control.close());
        assert!(!other.close());
        assert!(!control.close());
        assert!(other.is_closed());
        // The notification survives until the I/O task looks for it.
        tokio::time::timeout(std::time::Duration::from_secs(1), control.close_notify.notified())
            .await
            .expect("close notification was stored");
    }

    #[tokio::test]
    async fn window_change_is_forwarded_until_closed() {
        let (control, mut rx) = handle();
        control
            .window_change(WindowGeometry { rows: 40, cols: 120 })
            .await
            .unwrap();
        match rx.recv().await {
            Some(ChannelCommand::WindowChange { cols, rows }) => {
                assert_eq!((cols, rows), (120, 40));
            }
            None => panic!("expected a window change"),
        }

        control.close();
        control
            .window_change(WindowGeometry { rows: 10, cols: 10 })
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
