//! Forwards OS signals to a running session.
//!
//! Two tasks run for the session's lifetime: one turns window-change
//! notifications into remote PTY resizes, the other closes the session on the
//! first interrupt or terminate request. Outside a session, [`ShutdownSignal`]
//! lets a blocking wait end on the same two signals.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;

use crate::error::SshError;
use crate::terminal::{TerminalControl, WindowGeometry};

/// What the relay may do to a running session.
pub trait SessionControl: Clone + Send + Sync + 'static {
    fn window_change(
        &self,
        geometry: WindowGeometry,
    ) -> impl Future<Output = Result<(), SshError>> + Send;

    /// Returns `true` only for the call that actually closed the session.
    fn close(&self) -> bool;

    fn is_closed(&self) -> bool;
}

/// Event streams the relay listens to.
pub struct SignalSources {
    pub resize: BoxStream<'static, ()>,
    pub terminate: BoxStream<'static, ()>,
}

impl SignalSources {
    pub fn new(resize: BoxStream<'static, ()>, terminate: BoxStream<'static, ()>) -> Self {
        Self { resize, terminate }
    }

    /// SIGWINCH for resize; SIGINT or SIGTERM for termination.
    pub fn os() -> io::Result<Self> {
        let resize = signal_stream(signal(SignalKind::window_change())?);
        let interrupt = signal_stream(signal(SignalKind::interrupt())?);
        let terminate = signal_stream(signal(SignalKind::terminate())?);
        Ok(Self {
            resize,
            terminate: stream::select(interrupt, terminate).boxed(),
        })
    }

    /// Sources that never fire.
    pub fn none() -> Self {
        Self {
            resize: stream::pending().boxed(),
            terminate: stream::pending().boxed(),
        }
    }
}

fn signal_stream(signal: Signal) -> BoxStream<'static, ()> {
    stream::unfold(signal, |mut signal| async move {
        signal.recv().await.map(|()| ((), signal))
    })
    .boxed()
}

/// SIGINT or SIGTERM, for waits outside a running session.
///
/// After tokio registers either signal its default action stays replaced for
/// the rest of the process, so any wait that must end on Ctrl-C or a terminate
/// request has to listen for both. Only signals delivered after [`new`] count.
///
/// [`new`]: ShutdownSignal::new
pub struct ShutdownSignal {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignal {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolves on the next SIGINT or SIGTERM.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => tracing::debug!("SIGINT received"),
            _ = self.terminate.recv() => tracing::debug!("SIGTERM received"),
        }
    }
}

/// The armed listener tasks. Dropping the relay tears them down.
pub struct SignalRelay {
    resize_task: JoinHandle<()>,
    terminate_task: JoinHandle<()>,
    terminated: Arc<AtomicBool>,
}

impl SignalRelay {
    pub fn arm<C, T>(control: C, terminal: Arc<T>, sources: SignalSources) -> Self
    where
        C: SessionControl,
        T: TerminalControl,
    {
        let SignalSources {
            mut resize,
            mut terminate,
        } = sources;

        let resize_control = control.clone();
        let resize_task = tokio::spawn(async move {
            while resize.next().await.is_some() {
                if resize_control.is_closed() {
                    break;
                }
                let geometry = terminal.geometry();
                tracing::debug!("Terminal resized to {}x{}", geometry.cols, geometry.rows);
                if let Err(e) = resize_control.window_change(geometry).await {
                    tracing::debug!("Window change not delivered: {}", e);
                }
            }
        });

        let terminated = Arc::new(AtomicBool::new(false));
        let flag = terminated.clone();
        let terminate_task = tokio::spawn(async move {
            if terminate.next().await.is_some() {
                tracing::info!("Termination requested, closing session");
                flag.store(true, Ordering::SeqCst);
                control.close();
            }
        });

        Self {
            resize_task,
            terminate_task,
            terminated,
        }
    }

    /// Whether the termination listener fired.
    pub fn termination_requested(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn disarm(self) {}
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        self.resize_task.abort();
        self.terminate_task.abort();
    }
}
