//! InvenQuity session guard.
//!
//! Owns the client-held bearer token for the InvenQuity inventory front end:
//! acquisition at login, persistent storage, expiry warnings, renewal, logout and
//! role gating for admin-only views. Page components read derived state from a
//! [`identity::SessionGuard`] and never touch the stored token themselves.

pub mod identity;
pub mod storage;
pub mod config;
pub mod error;
pub mod cli;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use identity::{Role, Route, Gate, SessionGuard, SessionStatus, SessionSnapshot, SessionEvent};

// Debug printing helper: expands to eprintln! in tests and debug builds.
// Usage: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
