//! Local terminal control: geometry, raw mode and stdin.
//!
//! [`TerminalControl`] is the seam between the session lifecycle and the
//! process's controlling terminal; [`HostTerminal`] is the real implementation.

use std::io;
use std::os::unix::io::RawFd;

pub mod raw_mode;
pub mod stdin;

pub use raw_mode::TerminalStateGuard;

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub rows: u16,
    pub cols: u16,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// Operations the session needs from the local terminal.
pub trait TerminalControl: Send + Sync + 'static {
    /// Saved mode flags; consumed by exactly one `restore`.
    type Snapshot: Send;

    fn geometry(&self) -> WindowGeometry;

    fn enter_raw(&self) -> io::Result<Self::Snapshot>;

    fn restore(&self, snapshot: Self::Snapshot) -> io::Result<()>;
}

/// The process's terminal, addressed through a file descriptor.
#[derive(Debug, Clone, Copy)]
pub struct HostTerminal {
    fd: RawFd,
}

/// termios settings captured before entering raw mode.
pub struct TermiosSnapshot(libc::termios);

impl HostTerminal {
    /// The terminal attached to stdin. Fails if stdin is not a TTY.
    pub fn stdin() -> io::Result<Self> {
        Self::from_fd(libc::STDIN_FILENO)
    }

    pub fn from_fd(fd: RawFd) -> io::Result<Self> {
        if unsafe { libc::isatty(fd) } != 1 {
            return Err(io::Error::other("standard input is not a terminal"));
        }
        Ok(Self { fd })
    }
}

impl TerminalControl for HostTerminal {
    type Snapshot = TermiosSnapshot;

    /// Falls back to 80x24 when the size is unavailable.
    fn geometry(&self) -> WindowGeometry {
        let mut winsize = std::mem::MaybeUninit::<libc::winsize>::uninit();
        let result = unsafe { libc::ioctl(self.fd, libc::TIOCGWINSZ, winsize.as_mut_ptr()) };
        if result != 0 {
            return WindowGeometry::default();
        }

        let winsize = unsafe { winsize.assume_init() };
        if winsize.ws_row == 0 || winsize.ws_col == 0 {
            return WindowGeometry::default();
        }
        WindowGeometry {
            rows: winsize.ws_row,
            cols: winsize.ws_col,
        }
    }

    fn enter_raw(&self) -> io::Result<TermiosSnapshot> {
        let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();
        if unsafe { libc::tcgetattr(self.fd, termios.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let original = unsafe { termios.assume_init() };

        let mut raw = original;
        unsafe { libc::cfmakeraw(&mut raw) };
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;

        if unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }

        tracing::debug!("Entered raw terminal mode");
        Ok(TermiosSnapshot(original))
    }

    fn restore(&self, snapshot: TermiosSnapshot) -> io::Result<()> {
        if unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, &snapshot.0) } != 0 {
            return Err(io::Error::last_os_error());
        }
        tracing::debug!("Restored terminal settings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_is_80x24() {
        assert_eq!(WindowGeometry::default(), WindowGeometry { rows: 24, cols: 80 });
    }

    #[test]
    fn pipe_is_not_a_terminal() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        assert!(HostTerminal::from_fd(fds[0]).is_err());
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }

    #[test]
    fn host_terminal_round_trip_when_attached() {
        // Only meaningful with a TTY on stdin.
        let Ok(terminal) = HostTerminal::stdin() else {
            return;
        };
        let geometry = terminal.geometry();
        assert!(geometry.rows > 0 && geometry.cols > 0);
        if let Ok(snapshot) = terminal.enter_raw() {
            terminal.restore(snapshot).expect("restore");
        }
    }
}
