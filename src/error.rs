//! Error model for the session core and the HTTP client layer.
//! `AuthError` is `Clone` so a single refresh outcome can be handed to every waiter.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token could not be decoded; callers treat it as absent.
    #[error("malformed token")]
    MalformedToken,
    #[error("no refresh token available")]
    NoRefreshToken,
    /// The auth endpoint rejected the refresh token. Terminal for the session.
    #[error("refresh failed: {reason}")]
    RefreshFailed { reason: String },
    /// Transport-level failure (connect, timeout) talking to the auth endpoint.
    #[error("network error: {reason}")]
    Network { reason: String },
    #[error("login failed: {reason}")]
    LoginFailed { reason: String },
    #[error("not authenticated")]
    NotAuthenticated,
    /// The session was logged out or replaced while a refresh was outstanding.
    #[error("session ended during refresh")]
    SessionEnded,
    #[error("credential storage error: {reason}")]
    Storage { reason: String },
}

impl AuthError {
    pub fn refresh_failed<S: Into<String>>(reason: S) -> Self { AuthError::RefreshFailed { reason: reason.into() } }
    pub fn network<S: Into<String>>(reason: S) -> Self { AuthError::Network { reason: reason.into() } }
    pub fn login_failed<S: Into<String>>(reason: S) -> Self { AuthError::LoginFailed { reason: reason.into() } }
    pub fn storage<S: Into<String>>(reason: S) -> Self { AuthError::Storage { reason: reason.into() } }

    pub fn code_str(&self) -> &'static str {
        match self {
            AuthError::MalformedToken => "malformed_token",
            AuthError::NoRefreshToken => "no_refresh_token",
            AuthError::RefreshFailed { .. } => "refresh_failed",
            AuthError::Network { .. } => "network_error",
            AuthError::LoginFailed { .. } => "login_failed",
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::SessionEnded => "session_ended",
            AuthError::Storage { .. } => "storage_error",
        }
    }

    /// Whether this failure leaves the session Anonymous with credentials wiped.
    pub fn clears_session(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedToken
                | AuthError::NoRefreshToken
                | AuthError::RefreshFailed { .. }
                | AuthError::LoginFailed { .. }
        )
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_decode() || err.is_body() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

impl From<TransportError> for AuthError {
    fn from(err: TransportError) -> Self { AuthError::network(err.to_string()) }
}

/// Errors surfaced by `AuthenticatedClient`. HTTP error statuses are not errors here;
/// they come back as responses so callers see them unmodified.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}
