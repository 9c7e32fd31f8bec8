//! Common test utilities: fakes for the terminal and session seams.
#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;
use tokio::sync::Notify;

use tether::error::SshError;
use tether::relay::{SessionControl, SignalSources};
use tether::runner::{ShellLauncher, ShellSession};
use tether::ssh::ExitReport;
use tether::terminal::{TerminalControl, WindowGeometry};

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Poll `condition` for up to a second.
pub async fn settle<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Terminal that counts raw-mode transitions.
#[derive(Default)]
pub struct FakeTerminal {
    pub fail_raw: bool,
    pub entered: AtomicUsize,
    pub restored: AtomicUsize,
    pub geometry: Mutex<Option<WindowGeometry>>,
}

impl FakeTerminal {
    pub fn failing() -> Self {
        Self {
            fail_raw: true,
            ..Self::default()
        }
    }

    pub fn set_geometry(&self, geometry: WindowGeometry) {
        *self.geometry.lock() = Some(geometry);
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn restored(&self) -> usize {
        self.restored.load(Ordering::SeqCst)
    }
}

impl TerminalControl for FakeTerminal {
    type Snapshot = ();

    fn geometry(&self) -> WindowGeometry {
        self.geometry.lock().unwrap_or_default()
    }

    fn enter_raw(&self) -> io::Result<()> {
        if self.fail_raw {
            return Err(io::Error::other("not a terminal"));
        }
        self.entered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn restore(&self, _snapshot: ()) -> io::Result<()> {
        self.restored.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Session control that records what the relay asked of it.
#[derive(Clone, Default)]
pub struct FakeControl {
    closed: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
    changes: Arc<Mutex<Vec<WindowGeometry>>>,
    notify: Arc<Notify>,
}

impl FakeControl {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn changes(&self) -> Vec<WindowGeometry> {
        self.changes.lock().clone()
    }

    async fn closed(&self) {
        while !self.is_closed() {
            self.notify.notified().await;
        }
    }
}

impl SessionControl for FakeControl {
    async fn window_change(&self, geometry: WindowGeometry) -> Result<(), SshError> {
        if !self.is_closed() {
            self.changes.lock().push(geometry);
        }
        Ok(())
    }

    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// How a fake session behaves once launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Remote shell exits straight away with this status
    ExitWith(u32),
    /// Remote shell runs until the session is closed
    RunUntilClosed,
    /// Shell start is refused
    FailLaunch,
}

pub struct FakeSession {
    control: FakeControl,
    plan: Plan,
}

impl ShellSession for FakeSession {
    type Control = FakeControl;

    fn control(&self) -> FakeControl {
        self.control.clone()
    }

    async fn wait(&mut self) -> ExitReport {
        match self.plan {
            Plan::ExitWith(status) => ExitReport {
                exit_status: Some(status),
                ..ExitReport::default()
            },
            _ => {
                self.control.closed().await;
                ExitReport {
                    closed_locally: true,
                    ..ExitReport::default()
                }
            }
        }
    }
}

pub struct FakeLauncher {
    pub plan: Plan,
    pub control: FakeControl,
    pub launched_with: Arc<Mutex<Vec<WindowGeometry>>>,
    pub shutdowns: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            control: FakeControl::default(),
            launched_with: Arc::default(),
            shutdowns: Arc::default(),
        }
    }
}

impl ShellLauncher for FakeLauncher {
    type Session = FakeSession;

    async fn launch(&self, geometry: WindowGeometry) -> Result<FakeSession, SshError> {
        self.launched_with.lock().push(geometry);
        if self.plan == Plan::FailLaunch {
            return Err(SshError::ShellStart("rejected by server".to_string()));
        }
        Ok(FakeSession {
            control: self.control.clone(),
            plan: self.plan,
        })
    }

    async fn shutdown(self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Signal sources driven by the test.
pub struct SignalFeed {
    pub resize: mpsc::UnboundedSender<()>,
    pub terminate: mpsc::UnboundedSender<()>,
}

pub fn signal_feed() -> (SignalFeed, SignalSources) {
    let (resize, resize_rx) = mpsc::unbounded();
    let (terminate, terminate_rx) = mpsc::unbounded();
    (
        SignalFeed { resize, terminate },
        SignalSources::new(resize_rx.boxed(), terminate_rx.boxed()),
    )
}
