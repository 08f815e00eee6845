//!
//! invenquity token storage
//! ------------------------
//! Persistent client-side storage for the session token, keyed by a fixed name
//! (`token` by default). Only the session guard writes here; everything else
//! reads derived state from the guard.
//!
//! Two backends are provided:
//! - `MemoryTokenStore`: process-local slot, used by tests and embedders that
//!   persist elsewhere.
//! - `FileTokenStore`: one JSON document per key under a directory, written via
//!   temp file + rename so a crash never leaves a half-written token behind.
//!   On unix the file is created owner-only (0600).

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SessionResult;
use crate::tprintln;

pub const DEFAULT_TOKEN_KEY: &str = "token";

pub trait TokenStore: Send + Sync {
    /// Fixed name the token is stored under.
    fn key(&self) -> &str;
    fn load(&self) -> SessionResult<Option<String>>;
    /// Replace any stored token wholesale.
    fn save(&self, token: &str) -> SessionResult<()>;
    /// Remove the stored token. Clearing an empty store is not an error.
    fn clear(&self) -> SessionResult<()>;
}

#[derive(Debug)]
pub struct MemoryTokenStore {
    key: String,
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self { Self::with_key(DEFAULT_TOKEN_KEY) }

    pub fn with_key<S: Into<String>>(key: S) -> Self { Self { key: key.into(), slot: Mutex::new(None) } }

    /// Store pre-seeded with a token, as if left behind by an earlier run.
    pub fn with_token<S: Into<String>>(token: S) -> Self {
        let s = Self::new();
        *s.slot.lock() = Some(token.into());
        s
    }

    pub fn peek(&self) -> Option<String> { self.slot.lock().clone() }
}

impl Default for MemoryTokenStore {
    fn default() -> Self { Self::new() }
}

impl TokenStore for MemoryTokenStore {
    fn key(&self) -> &str { &self.key }

    fn load(&self) -> SessionResult<Option<String>> { Ok(self.slot.lock().clone()) }

    fn save(&self, token: &str) -> SessionResult<()> {
        *self.slot.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> SessionResult<()> {
        self.slot.lock().take();
        Ok(())
    }
}

/// On-disk shape of a stored token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    saved_at: DateTime<Utc>,
}

fn sanitize_key(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone)]
pub struct FileTokenStore {
    dir: PathBuf,
    key: String,
}

impl FileTokenStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self { Self::with_key(dir, DEFAULT_TOKEN_KEY) }

    pub fn with_key<P: AsRef<Path>, S: Into<String>>(dir: P, key: S) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), key: key.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(&self.key)))
    }
}

impl TokenStore for FileTokenStore {
    fn key(&self) -> &str { &self.key }

    fn load(&self) -> SessionResult<Option<String>> {
        let path = self.path();
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<StoredToken>(&text) {
            Ok(st) if !st.token.is_empty() => Ok(Some(st.token)),
            Ok(_) => Ok(None),
            Err(e) => {
                // Unreadable file counts as no token; the next save overwrites it.
                warn!(target: "invenquity::storage", "ignoring corrupt token file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, token: &str) -> SessionResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        let doc = StoredToken { token: token.to_string(), saved_at: Utc::now() };
        let bytes = serde_json::to_vec(&doc)
            .map_err(|e| crate::error::SessionError::storage(e.to_string()))?;
        write_private(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        tprintln!("storage.save key={} path={}", self.key, path.display());
        Ok(())
    }

    fn clear(&self) -> SessionResult<()> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                tprintln!("storage.clear key={} path={}", self.key, path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `bytes` to a freshly created file readable only by the owner.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    // A leftover temp file would keep its old mode through truncate.
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
