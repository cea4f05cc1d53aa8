//! Credential lifecycle: storage, claim decoding, the login state machine and single-flight refresh.
//! Keep the public surface thin and split implementation across sub-modules.

mod credentials;
mod codec;
mod store;
mod state;
mod coordinator;
mod provider;
mod session;

pub use credentials::{Credentials, UserProfile};
pub use codec::{decode, encode_unsigned, is_expired, Claims, DEFAULT_SKEW_SECS, MAX_SKEW_SECS};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use state::{AuthState, SessionEvent, StateTracker};
pub use coordinator::RefreshCoordinator;
pub use provider::{AuthProvider, HttpAuthProvider, LoginRequest, LoginResponse, RegisterRequest, TokenPair};
pub use session::{AuthSession, UserSession};
