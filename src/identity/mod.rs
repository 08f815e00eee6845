//! Client-side session and authorization gating.
//!
//! The guard decodes the bearer token's payload to decide what the UI shows. It
//! never verifies the signature, so every decision made here is a UX convenience
//! (hide a view, redirect) and not a security boundary: the backend must
//! re-authorize every privileged request on its own.
//! Keep the public surface thin and split implementation across sub-modules.

mod claims;
mod clock;
mod provider;
mod authorizer;
mod session;

pub use claims::{Claims, Role, decode_token, compose_unsigned};
pub use clock::{Clock, SystemClock, ManualClock};
pub use provider::{AuthBackend, HttpAuthBackend, LoginRequest, TokenResponse, LOGIN_PATH, REFRESH_PATH, LOGOUT_PATH};
pub use authorizer::{Route, Gate, gate_for, landing_route, ROLE_MISMATCH_REDIRECT};
pub use session::{SessionGuard, SessionStatus, SessionSnapshot, SessionEvent, ExpiryReason, RenewOutcome};
