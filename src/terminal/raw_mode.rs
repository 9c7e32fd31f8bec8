use std::sync::Arc;

use crate::error::SshError;

use super::TerminalControl;

/// Holds the terminal in raw mode; restores the saved mode exactly once.
///
/// Restoration happens on [`TerminalStateGuard::restore`] or, failing that, on drop.
pub struct TerminalStateGuard<T: TerminalControl> {
    terminal: Arc<T>,
    snapshot: Option<T::Snapshot>,
}

impl<T: TerminalControl> TerminalStateGuard<T> {
    pub fn acquire(terminal: Arc<T>) -> Result<Self, SshError> {
        let snapshot = terminal.enter_raw().map_err(SshError::Terminal)?;
        Ok(Self {
            terminal,
            snapshot: Some(snapshot),
        })
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn restore(mut self) -> Result<(), SshError> {
        self.restore_once()
    }

    fn restore_once(&mut self) -> Result<(), SshError> {
        match self.snapshot.take() {
            Some(snapshot) => self.terminal.restore(snapshot).map_err(SshError::Terminal),
            None => Ok(()),
        }
    }
}

impl<T: TerminalControl> Drop for TerminalStateGuard<T> {
    fn drop(&mut self) {
        if let Err(e) = self.restore_once() {
            tracing::warn!("Failed to restore terminal settings: {}", e);
        }
    }
}
