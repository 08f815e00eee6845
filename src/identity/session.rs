use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::authorizer::{gate_for, landing_route, Gate, Route};
use super::claims::{decode_token, Claims, Role};
use super::clock::{Clock, SystemClock};
use super::provider::{AuthBackend, HttpAuthBackend, LoginRequest};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::storage::{FileTokenStore, TokenStore};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated,
    AuthenticatedWarning,
}

impl SessionStatus {
    pub fn is_authenticated(&self) -> bool { !matches!(self, SessionStatus::Unauthenticated) }
}

/// Read-only view of the session for page components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub role: Option<Role>,
    pub expires_at: Option<DateTime<Utc>>,
    pub warning_active: bool,
}

impl SessionSnapshot {
    fn unauthenticated() -> Self {
        Self { status: SessionStatus::Unauthenticated, role: None, expires_at: None, warning_active: false }
    }

    pub fn is_authenticated(&self) -> bool { self.status.is_authenticated() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// `exp` reached, found at startup or by the periodic check.
    TokenExpired,
    /// Stored token could not be decoded.
    MalformedToken,
    RenewalFailed,
    LoggedOut,
    /// Explicit `force_expire()` from the page layer.
    Forced,
}

impl ExpiryReason {
    /// Public route the page layer should move to.
    pub fn redirect(&self) -> Route {
        match self {
            ExpiryReason::LoggedOut => Route::Home,
            _ => Route::Login,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Authenticated { role: Role },
    /// Drives the "session expiring" dialog (Continue → `renew`, Log Out → `logout`).
    WarningRaised { remaining: Duration },
    Renewed { role: Role },
    Expired { reason: ExpiryReason, redirect: Route },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewOutcome {
    Renewed,
    /// Renewal failed and the session was force-expired.
    Expired,
    NotAuthenticated,
    /// The session ended while the request was in flight; the response was dropped.
    Superseded,
}

/// Periodic expiry check bound to one session epoch. Dropping it aborts the task.
struct CheckTimer {
    handle: JoinHandle<()>,
}

impl CheckTimer {
    fn arm(inner: &Arc<GuardInner>, epoch: u64) -> Option<Self> {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            warn!(target: "invenquity::session", "no tokio runtime; periodic expiry check not armed");
            return None;
        };
        let weak: Weak<GuardInner> = Arc::downgrade(inner);
        let period = inner.check_interval;
        let handle = rt.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let guard = SessionGuard { inner };
                if guard.check_epoch(epoch).is_none() {
                    break;
                }
                if !guard.is_authenticated() {
                    break;
                }
            }
        });
        Some(Self { handle })
    }
}

impl Drop for CheckTimer {
    fn drop(&mut self) { self.handle.abort(); }
}

struct ActiveSession {
    token: String,
    claims: Claims,
    warning_active: bool,
}

#[derive(Default)]
struct GuardState {
    /// Bumped on every session begin, renewal and expiry. Timer ticks and
    /// in-flight backend calls carry the epoch they started under and are
    /// ignored once it moves.
    epoch: u64,
    session: Option<ActiveSession>,
    timer: Option<CheckTimer>,
}

struct GuardInner {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
    warning_threshold: Duration,
    state: Mutex<GuardState>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
}

/// Owner of the client-held session token.
///
/// Cheap to clone; all clones share one session. Operations are short and never
/// hold the state lock across an `.await`. Must be used inside a tokio runtime
/// for the periodic check to run.
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<GuardInner>,
}

impl SessionGuard {
    pub fn new(backend: Arc<dyn AuthBackend>, store: Arc<dyn TokenStore>, config: &SessionConfig) -> Self {
        Self::with_clock(backend, store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        backend: Arc<dyn AuthBackend>,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        config: &SessionConfig,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::unauthenticated());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(GuardInner {
                backend,
                store,
                clock,
                check_interval: config.check_interval,
                warning_threshold: config.warning_threshold,
                state: Mutex::new(GuardState::default()),
                snapshot_tx,
                events_tx,
            }),
        }
    }

    /// Guard wired to the HTTP backend and the on-disk token store from `config`.
    pub fn open(config: &SessionConfig) -> SessionResult<Self> {
        let backend = HttpAuthBackend::new(&config.base_url)?;
        let store = FileTokenStore::with_key(&config.token_dir, config.token_key.clone());
        Ok(Self::new(Arc::new(backend), Arc::new(store), config))
    }

    // ---- derived state ---------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot { self.inner.snapshot_tx.borrow().clone() }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> { self.inner.snapshot_tx.subscribe() }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> { self.inner.events_tx.subscribe() }

    pub fn is_authenticated(&self) -> bool { self.inner.state.lock().session.is_some() }

    pub fn role(&self) -> Option<Role> {
        self.inner.state.lock().session.as_ref().map(|s| s.claims.role.clone())
    }

    pub fn warning_active(&self) -> bool {
        self.inner.state.lock().session.as_ref().map(|s| s.warning_active).unwrap_or(false)
    }

    /// `Bearer <token>` for page components' own REST calls.
    pub fn authorization_header(&self) -> Option<String> {
        self.inner.state.lock().session.as_ref().map(|s| format!("Bearer {}", s.token))
    }

    /// Displayable claims (name, email, ...). Never use these for authorization.
    pub fn profile(&self) -> Option<Map<String, Value>> {
        self.inner.state.lock().session.as_ref().map(|s| s.claims.display_claims())
    }

    // ---- lifecycle -------------------------------------------------------

    /// Restore the session from storage on startup. Calling it again while the
    /// stored token is the one already held (a remount) keeps the running
    /// session as is, warning and in-flight renewal included.
    pub fn initialize(&self) -> SessionStatus {
        let stored = match self.inner.store.load() {
            Ok(t) => t,
            Err(e) => {
                warn!(target: "invenquity::session", "token store unreadable, starting unauthenticated: {}", e);
                None
            }
        };
        let Some(token) = stored else {
            debug!(target: "invenquity::session", "no stored token");
            return self.status();
        };
        match self.validate(&token) {
            Ok(claims) => {
                let mut st = self.inner.state.lock();
                if st.session.as_ref().is_some_and(|s| s.token == token) {
                    if st.timer.is_none() {
                        // remount after shutdown(): same session, same epoch
                        st.timer = CheckTimer::arm(&self.inner, st.epoch);
                    }
                    debug!(target: "invenquity::session", "stored token already active; keeping session");
                    return Self::status_of(&st);
                }
                let old = self.begin_locked(&mut st, token, claims, false);
                drop(st);
                drop(old);
            }
            Err(e) => {
                let reason = match e {
                    SessionError::Expired { .. } => ExpiryReason::TokenExpired,
                    _ => ExpiryReason::MalformedToken,
                };
                debug!(target: "invenquity::session", "discarding stored token: {}", e);
                let mut st = self.inner.state.lock();
                let old = self.expire_locked(&mut st, reason);
                drop(st);
                drop(old);
            }
        }
        self.status()
    }

    /// Exchange credentials for a token and begin a session. Returns the landing route.
    pub async fn login(&self, username: &str, password: &str) -> SessionResult<Route> {
        let req = LoginRequest::new(username, password);
        let token = self.inner.backend.login(&req).await?;
        let claims = self.validate(&token).map_err(|e| {
            warn!(target: "invenquity::session", "login returned an unusable token: {}", e);
            SessionError::login_failed("login returned an unusable token")
        })?;
        let route = landing_route(&claims.role);
        let mut st = self.inner.state.lock();
        // Saved under the lock so the store and the held token never diverge.
        self.inner.store.save(&token)?;
        let old = self.begin_locked(&mut st, token, claims, false);
        drop(st);
        drop(old);
        info!(target: "invenquity::session", "login ok user={} landing={}", username, route);
        Ok(route)
    }

    /// One expiry check. The timer calls this every `check_interval`.
    pub fn periodic_check(&self) -> SessionStatus {
        let epoch = self.inner.state.lock().epoch;
        self.check_epoch(epoch).unwrap_or_else(|| self.status())
    }

    /// Ask the backend for a fresh token. Any failure ends the session.
    pub async fn renew(&self) -> RenewOutcome {
        let (token, epoch) = {
            let st = self.inner.state.lock();
            match st.session.as_ref() {
                Some(s) => (s.token.clone(), st.epoch),
                None => return RenewOutcome::NotAuthenticated,
            }
        };

        let result = match self.inner.backend.refresh(&token).await {
            Ok(fresh) => self.validate(&fresh).map(|claims| (fresh, claims)),
            Err(e) => Err(e),
        };

        let mut st = self.inner.state.lock();
        if st.epoch != epoch || st.session.is_none() {
            debug!(target: "invenquity::session", "renewal resolved after the session ended; ignoring");
            return RenewOutcome::Superseded;
        }
        let result = result.and_then(|(fresh, claims)| {
            self.inner.store.save(&fresh)?;
            Ok((fresh, claims))
        });
        match result {
            Ok((fresh, claims)) => {
                let old = self.begin_locked(&mut st, fresh, claims, true);
                drop(st);
                drop(old);
                info!(target: "invenquity::session", "session renewed");
                RenewOutcome::Renewed
            }
            Err(e) => {
                warn!(target: "invenquity::session", "renewal failed ({}): {}", e.code(), e);
                let old = self.expire_locked(&mut st, ExpiryReason::RenewalFailed);
                drop(st);
                drop(old);
                RenewOutcome::Expired
            }
        }
    }

    /// End the session locally. Returns false (and does nothing) when already unauthenticated.
    pub fn force_expire(&self) -> bool {
        let mut st = self.inner.state.lock();
        if st.session.is_none() {
            return false;
        }
        let old = self.expire_locked(&mut st, ExpiryReason::Forced);
        drop(st);
        drop(old);
        true
    }

    /// Clear local state, then tell the backend. The notification is best effort
    /// and its outcome never changes local state.
    pub async fn logout(&self) {
        let token = {
            let mut st = self.inner.state.lock();
            let token = st.session.as_ref().map(|s| s.token.clone());
            let old = if token.is_some() {
                self.expire_locked(&mut st, ExpiryReason::LoggedOut)
            } else {
                // Never initialized: still make sure nothing is left on disk.
                if let Err(e) = self.inner.store.clear() {
                    warn!(target: "invenquity::session", "failed to clear token store: {}", e);
                }
                None
            };
            drop(st);
            drop(old);
            token
        };
        let Some(token) = token else {
            debug!(target: "invenquity::session", "logout with no active session");
            return;
        };
        match self.inner.backend.logout(&token).await {
            Ok(()) => debug!(target: "invenquity::session", "backend acknowledged logout"),
            Err(e) => warn!(target: "invenquity::session", "logout notification failed ({}): {}", e.code(), e),
        }
    }

    /// Gate a privileged view on `role`.
    pub fn require_role(&self, role: &Role) -> Gate {
        let now = self.inner.clock.now();
        let mut st = self.inner.state.lock();
        let lapsed = st.session.as_ref().map(|s| s.claims.is_expired_at(now)).unwrap_or(false);
        if lapsed {
            let old = self.expire_locked(&mut st, ExpiryReason::TokenExpired);
            drop(st);
            drop(old);
            return Gate::Redirect(Route::Login);
        }
        let gate = gate_for(st.session.as_ref().map(|s| &s.claims.role), role);
        if let Gate::Redirect(to) = gate {
            debug!(target: "invenquity::session", "role gate {} redirect to {}", role, to);
        }
        gate
    }

    /// Stop the periodic check without touching the session (app unmount).
    pub fn shutdown(&self) {
        let old = self.inner.state.lock().timer.take();
        drop(old);
    }

    // ---- internals -------------------------------------------------------

    fn status(&self) -> SessionStatus {
        let st = self.inner.state.lock();
        Self::status_of(&st)
    }

    fn status_of(st: &GuardState) -> SessionStatus {
        match st.session.as_ref() {
            None => SessionStatus::Unauthenticated,
            Some(s) if s.warning_active => SessionStatus::AuthenticatedWarning,
            Some(_) => SessionStatus::Authenticated,
        }
    }

    fn validate(&self, token: &str) -> SessionResult<Claims> {
        let claims = decode_token(token)?;
        if claims.is_expired_at(self.inner.clock.now()) {
            return Err(SessionError::Expired { exp: claims.exp });
        }
        Ok(claims)
    }

    /// Check bound to `epoch`; `None` when the epoch is stale or no session is active.
    fn check_epoch(&self, epoch: u64) -> Option<SessionStatus> {
        let now = self.inner.clock.now();
        let threshold = i64::try_from(self.inner.warning_threshold.as_secs()).unwrap_or(i64::MAX);
        let mut st = self.inner.state.lock();
        if st.epoch != epoch {
            return None;
        }
        let session = st.session.as_mut()?;
        let remaining = session.claims.remaining_secs(now);
        if remaining <= 0 {
            info!(target: "invenquity::session", "session expired");
            let old = self.expire_locked(&mut st, ExpiryReason::TokenExpired);
            drop(st);
            drop(old);
            return Some(SessionStatus::Unauthenticated);
        }
        if remaining <= threshold {
            if !session.warning_active {
                session.warning_active = true;
                info!(target: "invenquity::session", "session expires in {}s", remaining);
                self.publish(&st);
                self.emit(SessionEvent::WarningRaised { remaining: Duration::from_secs(remaining as u64) });
            }
        } else if session.warning_active {
            session.warning_active = false;
            self.publish(&st);
        }
        Some(Self::status_of(&st))
    }

    /// Install a new session and arm its timer. Returns the previous timer so
    /// the caller can drop it after releasing the lock.
    fn begin_locked(&self, st: &mut GuardState, token: String, claims: Claims, renewed: bool) -> Option<CheckTimer> {
        st.epoch += 1;
        let role = claims.role.clone();
        st.session = Some(ActiveSession { token, claims, warning_active: false });
        let old = st.timer.take();
        st.timer = CheckTimer::arm(&self.inner, st.epoch);
        self.publish(st);
        if renewed {
            self.emit(SessionEvent::Renewed { role });
        } else {
            info!(target: "invenquity::session", "session started role={}", role);
            self.emit(SessionEvent::Authenticated { role });
        }
        old
    }

    /// Terminal transition to Unauthenticated. Clears storage even when no
    /// session was active, so a bad stored token never survives a startup.
    fn expire_locked(&self, st: &mut GuardState, reason: ExpiryReason) -> Option<CheckTimer> {
        st.epoch += 1;
        st.session = None;
        let old = st.timer.take();
        if let Err(e) = self.inner.store.clear() {
            warn!(target: "invenquity::session", "failed to clear token store: {}", e);
        }
        self.publish(st);
        let redirect = reason.redirect();
        info!(target: "invenquity::session", "session ended reason={:?} redirect={}", reason, redirect);
        self.emit(SessionEvent::Expired { reason, redirect });
        old
    }

    fn publish(&self, st: &GuardState) {
        let snap = match st.session.as_ref() {
            None => SessionSnapshot::unauthenticated(),
            Some(s) => SessionSnapshot {
                status: Self::status_of(st),
                role: Some(s.claims.role.clone()),
                expires_at: s.claims.expires_at(),
                warning_active: s.warning_active,
            },
        };
        self.inner.snapshot_tx.send_replace(snap);
    }

    fn emit(&self, ev: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events_tx.send(ev);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
