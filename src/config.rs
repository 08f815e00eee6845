//!
//! Session configuration
//! ---------------------
//! Defaults, overridden by `INVENQUITY_*` environment variables, overridden in
//! turn by command-line flags.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::{SessionError, SessionResult};
use crate::storage::DEFAULT_TOKEN_KEY;

pub const DEFAULT_API_BASE: &str = "http://localhost:8080/api/invenquity";
pub const DEFAULT_TOKEN_DIR: &str = ".invenquity";
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_WARNING_THRESHOLD: Duration = Duration::from_secs(3 * 60);

pub const ENV_API_BASE: &str = "INVENQUITY_API_BASE";
pub const ENV_TOKEN_DIR: &str = "INVENQUITY_TOKEN_DIR";
pub const ENV_TOKEN_KEY: &str = "INVENQUITY_TOKEN_KEY";
pub const ENV_CHECK_INTERVAL_SECS: &str = "INVENQUITY_CHECK_INTERVAL_SECS";
pub const ENV_WARNING_SECS: &str = "INVENQUITY_WARNING_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    pub base_url: String,
    pub token_dir: PathBuf,
    pub token_key: String,
    /// Period of the expiry check while authenticated.
    pub check_interval: Duration,
    /// Remaining lifetime at or below which the expiry warning is raised.
    pub warning_threshold: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            token_dir: PathBuf::from(DEFAULT_TOKEN_DIR),
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

fn parse_secs(name: &str, raw: &str) -> SessionResult<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(SessionError::config(format!("{} must be greater than zero", name))),
        Ok(n) => Ok(Duration::from_secs(n)),
        Err(_) => Err(SessionError::config(format!("{} must be a whole number of seconds, got '{}'", name, raw))),
    }
}

/// Value following `flag`, if the flag is present.
fn flag_value(args: &[String], flag: &str) -> SessionResult<Option<String>> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return match args.get(i + 1) {
                Some(v) if !v.starts_with("--") => Ok(Some(v.clone())),
                _ => Err(SessionError::config(format!("{} requires a value", flag))),
            };
        }
        i += 1;
    }
    Ok(None)
}

impl SessionConfig {
    /// Apply overrides from a key lookup. Split out from `from_env` so the
    /// precedence rules can be exercised without touching process state.
    pub fn with_overrides<F>(mut self, lookup: F) -> SessionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.base_url = v;
        }
        if let Some(v) = lookup(ENV_TOKEN_DIR).filter(|v| !v.trim().is_empty()) {
            self.token_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_TOKEN_KEY).filter(|v| !v.trim().is_empty()) {
            self.token_key = v;
        }
        if let Some(v) = lookup(ENV_CHECK_INTERVAL_SECS) {
            self.check_interval = parse_secs(ENV_CHECK_INTERVAL_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_WARNING_SECS) {
            self.warning_threshold = parse_secs(ENV_WARNING_SECS, &v)?;
        }
        Ok(self)
    }

    pub fn from_env() -> SessionResult<Self> {
        Self::default().with_overrides(|k| env::var(k).ok())
    }

    /// CLI flags override whatever the environment set.
    pub fn apply_args(mut self, args: &[String]) -> SessionResult<Self> {
        if let Some(v) = flag_value(args, "--api-base")? {
            self.base_url = v;
        }
        if let Some(v) = flag_value(args, "--token-dir")? {
            self.token_dir = PathBuf::from(v);
        }
        Ok(self)
    }
}
