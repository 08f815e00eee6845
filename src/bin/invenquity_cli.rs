//!
//! invenquity session CLI
//! ----------------------
//! Command-line front end for the session guard: log in against the InvenQuity
//! backend, inspect or renew the stored session, gate on a role, log out.
//! Configuration comes from INVENQUITY_* environment variables and CLI flags.

use anyhow::{Context, Result};
use std::env;

use invenquity_session::cli::{self, Command};
use invenquity_session::{SessionConfig, SessionGuard};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("invalid RUST_LOG filter")?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = cli::parse_command(&args)?;
    if command == Command::Help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let config = SessionConfig::from_env()
        .and_then(|c| c.apply_args(&args))
        .context("failed to load configuration")?;
    tracing::debug!(
        target: "invenquity",
        "api_base={} token_dir={} check_interval={:?}",
        config.base_url, config.token_dir.display(), config.check_interval
    );
    let guard = SessionGuard::open(&config)?;

    match command {
        Command::Login { username, password } => {
            let landing = guard.login(&username, &password).await?;
            println!("logged in; open {}", landing);
        }
        Command::Status => {
            guard.initialize();
            println!("{}", cli::snapshot_json(&guard.snapshot()));
            if let Some(profile) = guard.profile() {
                println!("{}", serde_json::Value::Object(profile));
            }
        }
        Command::Renew => {
            guard.initialize();
            println!("{}", cli::renew_message(guard.renew().await));
        }
        Command::Logout => {
            guard.initialize();
            guard.logout().await;
            println!("logged out");
        }
        Command::Gate { role } => {
            guard.initialize();
            let gate = guard.require_role(&role);
            println!("{}", cli::gate_json(&role, gate));
        }
        Command::Watch { auto_renew } => {
            cli::watch(&guard, auto_renew).await?;
        }
        Command::Help => {}
    }
    guard.shutdown();
    Ok(())
}
