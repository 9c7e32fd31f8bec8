//! Numbered host list shown when no destination is given on the command line.
//!
//! Each pick runs one session; afterwards the list is shown again until the
//! user quits.

use std::future::Future;
use std::io::{self, BufRead, Write};

use tokio::sync::oneshot;

use crate::cli::local_username;
use crate::config::HostEntry;
use crate::error::SshError;
use crate::relay::ShutdownSignal;
use crate::runner::{ConnectContext, ssh_connect};
use crate::ssh::session::SessionOutcome;

/// Cursor home, then erase the whole screen.
pub const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Quit,
    Invalid,
    /// Zero-based index into the host list
    Index(usize),
}

/// Interpret one line of input against a list of `count` hosts.
pub fn parse_selection(input: &str, count: usize) -> Selection {
    let input = input.trim();
    if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("quit") {
        return Selection::Quit;
    }
    match input.parse::<usize>() {
        Ok(n) if n >= 1 && n <= count => Selection::Index(n - 1),
        _ => Selection::Invalid,
    }
}

pub fn render_table(hosts: &[HostEntry], default_user: &str) -> String {
    let rows: Vec<[String; 5]> = hosts
        .iter()
        .enumerate()
        .map(|(i, host)| {
            [
                (i + 1).to_string(),
                host.alias.clone(),
                host.hostname.clone(),
                host.user.clone().unwrap_or_else(|| default_user.to_string()),
                host.port().to_string(),
            ]
        })
        .collect();

    let header = ["#", "Host", "HostName", "User", "Port"];
    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: [&str; 5]| {
        let line: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        out.push_str(line.join(" | ").trim_end());
        out.push('\n');
    };

    push_row(header);
    for row in &rows {
        push_row([
            row[0].as_str(),
            row[1].as_str(),
            row[2].as_str(),
            row[3].as_str(),
            row[4].as_str(),
        ]);
    }
    out
}

pub fn clear_screen() {
    let mut stdout = io::stdout();
    let _ = stdout.write_all(CLEAR_SCREEN.as_bytes());
    let _ = stdout.flush();
}

/// Read one line from stdin. `None` on EOF, SIGINT or SIGTERM.
///
/// The read runs on a detached thread so that an abandoned read never holds
/// up process exit.
async fn read_line() -> io::Result<Option<String>> {
    let mut shutdown = ShutdownSignal::new()?;
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let result = io::stdin()
            .lock()
            .read_line(&mut line)
            .map(|n| if n == 0 { None } else { Some(line) });
        let _ = tx.send(result);
    });

    line_or_shutdown(async { rx.await.unwrap_or(Ok(None)) }, &mut shutdown).await
}

async fn line_or_shutdown<F>(line: F, shutdown: &mut ShutdownSignal) -> io::Result<Option<String>>
where
    F: Future<Output = io::Result<Option<String>>>,
{
    tokio::select! {
        biased;
        result = line => result,
        () = shutdown.recv() => Ok(None),
    }
}

fn prompt(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()
}

/// Show `hosts`, connect to the one picked, repeat until the user quits.
///
/// Connection failures are reported and never end the loop.
pub async fn run_picker(ctx: &ConnectContext, hosts: &[HostEntry]) -> io::Result<()> {
    if hosts.is_empty() {
        println!("No hosts found in your SSH config.");
        return Ok(());
    }
    let default_user = local_username();

    loop {
        println!("SSH Config {}\n", env!("CARGO_PKG_VERSION"));
        print!("{}", render_table(hosts, &default_user));
        prompt("\nSelect a host (number, q to quit): ")?;

        let Some(line) = read_line().await? else {
            println!();
            return Ok(());
        };

        let entry = match parse_selection(&line, hosts.len()) {
            Selection::Quit => return Ok(()),
            Selection::Invalid => {
                println!("Invalid selection: {}", line.trim());
                continue;
            }
            Selection::Index(index) => &hosts[index],
        };

        clear_screen();
        let result = connect_entry(ctx, entry, &default_user).await;
        clear_screen();

        match result {
            Ok(outcome) => {
                tracing::info!("Session with {} ended: {:?}", entry.alias, outcome);
            }
            Err(e @ SshError::Cancelled { .. }) => {
                tracing::info!("{}", e);
                println!("{}\n", e);
            }
            Err(e) => {
                tracing::warn!("Session with {} failed: {}", entry.alias, e);
                if e.is_recoverable() {
                    println!("Could not connect to {}: {}", entry.alias, e);
                } else {
                    println!("Session with {} ended: {}", entry.alias, e);
                }
                prompt("Press Enter to return to the host list")?;
                if read_line().await?.is_none() {
                    println!();
                    return Ok(());
                }
                clear_screen();
            }
        }
    }
}

async fn connect_entry(
    ctx: &ConnectContext,
    entry: &HostEntry,
    default_user: &str,
) -> Result<SessionOutcome, SshError> {
    let target = entry.to_target(default_user)?;
    let ctx = ctx.with_identity(entry.identity_file.clone());
    ssh_connect(&ctx, &target).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(alias: &str, hostname: &str, user: Option<&str>, port: Option<u16>) -> HostEntry {
        HostEntry {
            alias: alias.to_string(),
            hostname: hostname.to_string(),
            user: user.map(str::to_string),
            port,
            identity_file: None,
        }
    }

    #[test]
    fn selection_is_one_based() {
        assert_eq!(parse_selection("1\n", 3), Selection::Index(0));
        assert_eq!(parse_selection(" 3 ", 3), Selection::Index(2));
        assert_eq!(parse_selection("0", 3), Selection::Invalid);
        assert_eq!(parse_selection("4", 3), Selection::Invalid);
    }

    #[test]
    fn quit_and_garbage() {
        assert_eq!(parse_selection("q", 3), Selection::Quit);
        assert_eq!(parse_selection("Q\n", 3), Selection::Quit);
        assert_eq!(parse_selection("quit", 3), Selection::Quit);
        assert_eq!(parse_selection("", 3), Selection::Invalid);
        assert_eq!(parse_selection("web", 3), Selection::Invalid);
    }

    #[test]
    fn table_lists_hosts_with_fallback_user() {
        let hosts = vec![
            entry("web", "web.example.com", Some("deploy"), None),
            entry("db", "10.0.0.5", None, Some(2222)),
        ];
        let table = render_table(&hosts, "alice");
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("# | Host | HostName"));
        assert_eq!(lines[1], "1 | web  | web.example.com | deploy | 22");
        assert_eq!(lines[2], "2 | db   | 10.0.0.5        | alice  | 2222");
    }

    #[tokio::test]
    async fn terminate_request_ends_line_wait() {
        let mut shutdown = ShutdownSignal::new().unwrap();
        unsafe {
            libc::raise(libc::SIGTERM);
        }
        let line = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            line_or_shutdown(std::future::pending(), &mut shutdown),
        )
        .await
        .expect("SIGTERM did not end the wait");
        assert_eq!(line.unwrap(), None);
    }

    #[tokio::test]
    async fn typed_line_is_returned() {
        let mut shutdown = ShutdownSignal::new().unwrap();
        let line = line_or_shutdown(async { Ok(Some("2\n".to_string())) }, &mut shutdown)
            .await
            .unwrap();
        assert_eq!(line.as_deref(), Some("2\n"));
    }

    #[test]
    fn clear_sequence_homes_then_erases() {
        assert_eq!(CLEAR_SCREEN, "\x1b[H\x1b[2J");
    }
}
