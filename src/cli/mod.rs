use serde_json::{json, Value};

use crate::error::{SessionError, SessionResult};
use crate::identity::{Gate, RenewOutcome, Role, SessionEvent, SessionGuard, SessionSnapshot};

pub const USAGE: &str = "InvenQuity session CLI

USAGE:
  invenquity_cli [--api-base URL] [--token-dir PATH] <COMMAND>

COMMANDS:
  login <USERNAME> <PASSWORD>   Log in and store the session token
  status                        Show the current session
  renew                         Exchange the stored token for a fresh one
  logout                        Log out locally and notify the backend
  gate <ROLE>                   Check whether the session may open a ROLE-only view
  watch [--auto-renew]          Run the expiry check and print session events

OPTIONS:
  --api-base URL    Backend base URL (env: INVENQUITY_API_BASE, default http://localhost:8080/api/invenquity)
  --token-dir PATH  Token storage folder (env: INVENQUITY_TOKEN_DIR, default .invenquity)
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Status,
    Renew,
    Logout,
    Gate { role: Role },
    Watch { auto_renew: bool },
    Help,
}

/// Flags that take a value; their values are skipped when looking for the command.
const VALUE_FLAGS: [&str; 2] = ["--api-base", "--token-dir"];

fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let a = args[i].as_str();
        if VALUE_FLAGS.contains(&a) {
            i += 2;
            continue;
        }
        if !a.starts_with("--") && a != "-h" {
            out.push(a);
        }
        i += 1;
    }
    out
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Parse arguments (without the program name) into a command.
pub fn parse_command(args: &[String]) -> SessionResult<Command> {
    if has_flag(args, "--help") || has_flag(args, "-h") {
        return Ok(Command::Help);
    }
    let pos = positionals(args);
    let Some((cmd, rest)) = pos.split_first() else {
        return Ok(Command::Help);
    };
    match (*cmd, rest) {
        ("login", [user, pass]) => Ok(Command::Login { username: user.to_string(), password: pass.to_string() }),
        ("login", _) => Err(SessionError::config("usage: login <USERNAME> <PASSWORD>")),
        ("status", []) => Ok(Command::Status),
        ("renew", []) => Ok(Command::Renew),
        ("logout", []) => Ok(Command::Logout),
        ("gate", [role]) => Ok(Command::Gate { role: Role::from(*role) }),
        ("gate", _) => Err(SessionError::config("usage: gate <ROLE>")),
        ("watch", []) => Ok(Command::Watch { auto_renew: has_flag(args, "--auto-renew") }),
        ("help", _) => Ok(Command::Help),
        (other, _) => Err(SessionError::config(format!("unknown command or arguments: {}", other))),
    }
}

pub fn snapshot_json(snap: &SessionSnapshot) -> Value {
    json!({
        "status": snap.status,
        "role": snap.role,
        "expires_at": snap.expires_at.map(|t| t.to_rfc3339()),
        "warning_active": snap.warning_active,
    })
}

pub fn gate_json(role: &Role, gate: Gate) -> Value {
    match gate {
        Gate::Allow => json!({"role": role, "allowed": true}),
        Gate::Redirect(to) => json!({"role": role, "allowed": false, "redirect": to.path()}),
    }
}

pub fn renew_message(outcome: RenewOutcome) -> &'static str {
    match outcome {
        RenewOutcome::Renewed => "session renewed",
        RenewOutcome::Expired => "renewal failed; logged out",
        RenewOutcome::NotAuthenticated => "not logged in",
        RenewOutcome::Superseded => "session ended before renewal completed",
    }
}

pub fn event_line(ev: &SessionEvent) -> String {
    match ev {
        SessionEvent::Authenticated { role } => format!("authenticated role={}", role),
        SessionEvent::WarningRaised { remaining } => {
            format!("session expires in {}s (renew to continue, logout to leave)", remaining.as_secs())
        }
        SessionEvent::Renewed { role } => format!("renewed role={}", role),
        SessionEvent::Expired { reason, redirect } => format!("session ended ({:?}); go to {}", reason, redirect),
    }
}

/// Print events until the session ends or Ctrl-C. With `auto_renew`, every
/// expiry warning is answered with a renewal, as the "Continue" button does.
pub async fn watch(guard: &SessionGuard, auto_renew: bool) -> SessionResult<()> {
    let mut events = guard.events();
    guard.initialize();
    if !guard.is_authenticated() {
        println!("not logged in");
        return Ok(());
    }
    println!("{}", snapshot_json(&guard.snapshot()));
    loop {
        tokio::select! {
            ev = events.recv() => {
                let ev = match ev {
                    Ok(ev) => ev,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                println!("{}", event_line(&ev));
                match ev {
                    SessionEvent::WarningRaised { .. } if auto_renew => {
                        println!("{}", renew_message(guard.renew().await));
                    }
                    SessionEvent::Expired { .. } => break,
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                guard.shutdown();
                break;
            }
        }
    }
    Ok(())
}
