//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::error::SshError;
use crate::ssh::target::Target;

/// Pick a host from your SSH config and open an interactive shell on it
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Connect straight to [user@]host[:port] instead of showing the host list
    pub destination: Option<String>,

    /// User to log in as
    #[arg(short = 'l', long = "login")]
    pub login: Option<String>,

    /// Port to connect to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Private key file to authenticate with
    #[arg(short, long)]
    pub identity: Option<PathBuf>,

    /// Config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// TCP connect timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub connect_timeout: Option<u64>,
}

impl Cli {
    /// Resolve the destination argument, if any, into a target.
    ///
    /// `-l` beats `user@`, which beats the local user; `-p` beats `:port`.
    pub fn target(&self) -> Option<Result<Target, SshError>> {
        self.destination
            .as_deref()
            .map(|destination| resolve_target(destination, self.login.as_deref(), self.port))
    }
}

pub fn resolve_target(
    destination: &str,
    login: Option<&str>,
    port: Option<u16>,
) -> Result<Target, SshError> {
    let (user_part, address) = match destination.rsplit_once('@') {
        Some((user, address)) => (Some(user), address),
        None => (None, destination),
    };

    let user = match login.or(user_part) {
        Some(user) => user.to_string(),
        None => local_username(),
    };

    let mut target = Target::parse(address, &user)?;
    if let Some(port) = port {
        if port == 0 {
            return Err(SshError::InvalidTarget {
                input: destination.to_string(),
                reason: "invalid port".to_string(),
            });
        }
        target.port = port;
    }
    Ok(target)
}

/// The account name of the local user, from `$USER` or `$USERNAME`.
pub fn local_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}
