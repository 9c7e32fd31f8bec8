use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tokio::sync::mpsc;

const POLL_INTERVAL_MS: libc::c_int = 100;

/// Reads stdin on a dedicated thread and forwards chunks over a channel.
///
/// The thread polls so that it notices a stop request within one interval;
/// dropping the reader stops and joins it.
pub struct StdinReader {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StdinReader {
    pub fn spawn() -> (Self, mpsc::Receiver<Vec<u8>>) {
        Self::from_fd(libc::STDIN_FILENO)
    }

    pub fn from_fd(fd: RawFd) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(64);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let thread = std::thread::spawn(move || {
            read_loop(fd, &thread_stop, &tx);
            tracing::debug!("stdin reader thread exiting");
        });

        (
            Self {
                stop,
                thread: Some(thread),
            },
            rx,
        )
    }
}

fn read_loop(fd: RawFd, stop: &AtomicBool, tx: &mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; 4096];

    while !stop.load(Ordering::SeqCst) {
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut pollfd, 1, POLL_INTERVAL_MS) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::error!("stdin poll error: {}", err);
            return;
        }
        if ready == 0 {
            continue;
        }

        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        match n {
            0 => {
                tracing::debug!("stdin EOF");
                return;
            }
            n if n < 0 => {
                let err = io::Error::last_os_error();
                if matches!(
                    err.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) {
                    continue;
                }
                tracing::error!("stdin read error: {}", err);
                return;
            }
            n => {
                if tx.blocking_send(buf[..n as usize].to_vec()).is_err() {
                    tracing::debug!("stdin receiver dropped");
                    return;
                }
            }
        }
    }
}

impl Drop for StdinReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
