pub mod error;
pub mod config;
pub mod logging;
pub mod identity;
pub mod client;

pub use error::{AuthError, AuthResult, ClientError, TransportError};
pub use config::{ClientConfig, Endpoints};
pub use identity::{AuthSession, AuthState, Credentials, RefreshCoordinator, SessionEvent, UserProfile};
pub use client::{ApiRequest, ApiResponse, AuthenticatedClient, Transport};

// Test-only printing helper: expands to eprintln! during tests and debug builds.
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
