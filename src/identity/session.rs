use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::codec;
use super::coordinator::RefreshCoordinator;
use super::credentials::{Credentials, UserProfile};
use super::provider::{AuthProvider, LoginRequest, RegisterRequest};
use super::state::{AuthState, SessionEvent, StateTracker};
use super::store::CredentialStore;
use crate::client::{ApiRequest, AuthenticatedClient};
use crate::error::{AuthError, AuthResult, ClientError};

/// What a successful login hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub user: UserProfile,
    pub roles: BTreeSet<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    user: UserProfile,
    #[serde(default)]
    roles: Option<BTreeSet<String>>,
    #[serde(default)]
    permissions: Option<BTreeSet<String>>,
}

/// The login state machine. Credentials in the store are the source of truth; the session
/// only tracks which state they are in and coordinates transitions.
pub struct AuthSession {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn AuthProvider>,
    state: Arc<StateTracker>,
    coordinator: Arc<RefreshCoordinator>,
    skew: Duration,
    profile_path: String,
}

impl AuthSession {
    pub fn new(store: Arc<dyn CredentialStore>, provider: Arc<dyn AuthProvider>, skew: Duration) -> Arc<Self> {
        Self::with_profile_path(store, provider, skew, "/user/profile")
    }

    pub fn with_profile_path(store: Arc<dyn CredentialStore>, provider: Arc<dyn AuthProvider>, skew: Duration, profile_path: &str) -> Arc<Self> {
        let state = Arc::new(StateTracker::new(AuthState::Anonymous));
        let coordinator = RefreshCoordinator::new(store.clone(), provider.clone(), state.clone(), skew);
        let session = Self { store, provider, state, coordinator, skew, profile_path: profile_path.to_string() };
        session.restore();
        Arc::new(session)
    }

    /// Derive the state from whatever was persisted by a previous run. A pair whose access
    /// token is already inside the skew window comes back as `Expired`.
    pub fn restore(&self) -> AuthState {
        let creds = self.store.load();
        let next = match creds.access_token.as_deref() {
            Some(token) if creds.has_token_pair() => {
                if codec::is_expired(token, self.skew) { AuthState::Expired } else { AuthState::Authenticated }
            }
            _ => AuthState::Anonymous,
        };
        self.state.set(next);
        next
    }

    pub fn state(&self) -> AuthState { self.state.get() }
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> { &self.coordinator }
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.state.subscribe() }

    pub async fn login(&self, req: &LoginRequest) -> AuthResult<UserSession> {
        match self.try_login(req).await {
            Ok(s) => Ok(s),
            Err(e) => {
                warn!(target: "sessionguard::session", "login for '{}' failed: {}", req.username, e);
                if let Err(clear) = self.reset_local("login failed") {
                    warn!(target: "sessionguard::session", "failed to clear credentials: {}", clear);
                }
                Err(e)
            }
        }
    }

    async fn try_login(&self, req: &LoginRequest) -> AuthResult<UserSession> {
        let resp = self.provider.login(req).await?;
        let (Some(token), Some(refresh_token)) = (resp.token, resp.refresh_token) else {
            return Err(AuthError::login_failed("invalid authentication response"));
        };
        let claims = codec::decode(&token).map_err(|_| AuthError::login_failed("malformed access token"))?;
        let user = UserProfile { id: claims.subject_id, user_name: resp.user_name, email: resp.email };
        let creds = Credentials {
            access_token: Some(token),
            refresh_token: Some(refresh_token),
            user: Some(user.clone()),
            roles: resp.roles.into_iter().collect(),
            permissions: BTreeSet::new(),
        };
        // a refresh still running for the previous session must not overwrite this one
        self.coordinator.exclusive(|| {
            self.state.bump_epoch();
            self.store.save(&creds)?;
            self.state.set(AuthState::Authenticated);
            Ok::<(), AuthError>(())
        })?;
        self.state.emit(SessionEvent::SignedIn { user_id: user.id.clone() });
        info!(target: "sessionguard::session", "signed in user_id={}", user.id);
        Ok(UserSession { user, roles: creds.roles, expires_at: claims.expires_at })
    }

    /// Best-effort remote logout; local credentials are cleared whatever the server says.
    pub async fn logout(&self) -> AuthResult<()> {
        if let Some(refresh_token) = self.store.load().refresh_token {
            if let Err(e) = self.provider.logout(&refresh_token).await {
                warn!(target: "sessionguard::session", "remote logout failed, clearing locally: {}", e);
            }
        }
        self.reset_local("logout")
    }

    pub async fn register(&self, req: &RegisterRequest) -> AuthResult<serde_json::Value> {
        self.provider.register(req).await
    }

    /// A usable access token, refreshing first if it is within the skew window.
    /// `None` means the caller is effectively anonymous (or the refresh failed).
    pub async fn ensure_valid_token(&self) -> Option<String> {
        let token = self.store.load().access_token?;
        let claims = match codec::decode(&token) {
            Ok(c) => c,
            Err(_) => {
                warn!(target: "sessionguard::session", "stored access token is malformed, discarding session");
                if let Err(e) = self.reset_local("malformed access token") {
                    warn!(target: "sessionguard::session", "failed to clear credentials: {}", e);
                }
                return None;
            }
        };
        let stale = matches!(self.state.get(), AuthState::Expired | AuthState::Refreshing);
        if !stale && !claims.is_expired_at(Utc::now(), self.skew) {
            return Some(token);
        }
        match self.coordinator.replace_stale(&token).await {
            Ok(t) => Some(t),
            Err(e) => {
                debug!(target: "sessionguard::session", "refresh did not produce a token: {}", e);
                None
            }
        }
    }

    /// `GET` the profile endpoint through `client` and replace user, roles and permissions.
    pub async fn fetch_user_profile(&self, client: &AuthenticatedClient) -> Result<UserProfile, ClientError> {
        if !self.is_authenticated() { return Err(AuthError::NotAuthenticated.into()); }
        let epoch = self.state.epoch();
        let resp = client.send(ApiRequest::get(self.profile_path.as_str())).await?;
        if resp.is_unauthorized() { return Err(AuthError::NotAuthenticated.into()); }
        if !resp.is_success() {
            return Err(crate::error::TransportError::Request(format!("profile fetch returned HTTP {}", resp.status)).into());
        }
        let profile: ProfileResponse = resp.json()?;
        self.coordinator.exclusive(|| {
            let mut creds = self.store.load();
            if self.state.epoch() != epoch || !creds.has_token_pair() {
                return Err(AuthError::SessionEnded);
            }
            creds.user = Some(profile.user.clone());
            if let Some(roles) = profile.roles { creds.roles = roles; }
            if let Some(permissions) = profile.permissions { creds.permissions = permissions; }
            self.store.save(&creds)
        })?;
        Ok(profile.user)
    }

    fn reset_local(&self, reason: &str) -> AuthResult<()> {
        let (cleared, was) = self.coordinator.exclusive(|| {
            self.state.bump_epoch();
            let cleared = self.store.clear();
            let was = self.state.get();
            self.state.set(AuthState::Anonymous);
            (cleared, was)
        });
        if was != AuthState::Anonymous {
            self.state.emit(SessionEvent::SignedOut { reason: reason.to_string() });
        }
        cleared
    }

    // --- queries over the current credentials; all false when anonymous ---

    pub fn is_authenticated(&self) -> bool { self.store.load().has_token_pair() }
    pub fn current_user(&self) -> Option<UserProfile> { self.store.load().user }
    pub fn user_name(&self) -> String { self.current_user().map(|u| u.user_name).unwrap_or_default() }
    pub fn user_email(&self) -> String { self.current_user().map(|u| u.email).unwrap_or_default() }
    pub fn roles(&self) -> BTreeSet<String> { self.store.load().roles }
    pub fn permissions(&self) -> BTreeSet<String> { self.store.load().permissions }

    pub fn has_role(&self, role: &str) -> bool {
        let c = self.store.load();
        c.has_token_pair() && c.has_role(role)
    }

    pub fn has_any_role<I, S>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let c = self.store.load();
        c.has_token_pair() && roles.into_iter().any(|r| c.has_role(r.as_ref()))
    }

    pub fn has_all_roles<I, S>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let c = self.store.load();
        c.has_token_pair() && roles.into_iter().all(|r| c.has_role(r.as_ref()))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        let c = self.store.load();
        c.has_token_pair() && c.has_permission(permission)
    }

    pub fn has_any_permission<I, S>(&self, permissions: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let c = self.store.load();
        c.has_token_pair() && permissions.into_iter().any(|p| c.has_permission(p.as_ref()))
    }

    pub fn token_expiration(&self) -> Option<DateTime<Utc>> {
        let token = self.store.load().access_token?;
        codec::decode(&token).ok()?.expires_at
    }

    pub fn is_token_expired(&self) -> bool {
        match self.store.load().access_token {
            Some(t) => codec::is_expired(&t, self.skew),
            None => true,
        }
    }
}
