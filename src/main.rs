use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use tether::cli::Cli;
use tether::config::{AppConfig, paths, ssh_config};
use tether::error::SshError;
use tether::runner::{ConnectContext, ssh_connect};

/// Exit status for local failures, as OpenSSH uses.
const EXIT_FAILURE: u8 = 255;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging with file output.
    let log_dir = paths::ensure_log_dir().ok();
    let _guard = tether::logging::init_logging(log_dir);

    tracing::info!("Starting tether {}", env!("CARGO_PKG_VERSION"));
    if let Some(dir) = paths::log_dir() {
        tracing::info!("Logging to {}", dir.display());
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("tether: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(ms) = cli.connect_timeout {
        config.ssh.connect_timeout_ms = ms;
    }
    let ctx = ConnectContext::new(config.ssh.clone()).with_identity_override(cli.identity.clone());

    match cli.target() {
        Some(target) => {
            let target = target?;
            Ok(exit_code(ssh_connect(&ctx, &target).await))
        }
        None => {
            let hosts = match config.hosts.ssh_config_path() {
                Some(path) => ssh_config::load_hosts(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => Vec::new(),
            };
            tracing::info!("Loaded {} hosts", hosts.len());
            tether::picker::run_picker(&ctx, &hosts).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(result: Result<tether::ssh::SessionOutcome, SshError>) -> ExitCode {
    match result {
        Ok(outcome) => {
            tracing::info!("Session finished: {:?}", outcome);
            ExitCode::SUCCESS
        }
        Err(SshError::RemoteShell { status }) => {
            ExitCode::from(u8::try_from(status).unwrap_or(EXIT_FAILURE))
        }
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("tether: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
