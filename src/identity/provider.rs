use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{ApiRequest, ApiResponse, Transport};
use crate::config::Endpoints;
use crate::error::{AuthError, AuthResult};

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest").field("username", &self.username).field("password", &"<redacted>").finish()
    }
}

#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Any additional fields the server's registration form expects.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Body of a successful `POST /auth/login`. Tokens are optional here so a response that
/// omits them can be reported as a login failure instead of a parse error.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("TokenPair(<redacted>)") }
}

/// The remote authentication endpoint.
pub trait AuthProvider: Send + Sync {
    fn login<'a>(&'a self, req: &'a LoginRequest) -> BoxFuture<'a, AuthResult<LoginResponse>>;
    /// Any non-2xx answer is a `RefreshFailed`; transport trouble is `Network`.
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, AuthResult<TokenPair>>;
    fn logout<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, AuthResult<()>>;
    fn register<'a>(&'a self, req: &'a RegisterRequest) -> BoxFuture<'a, AuthResult<serde_json::Value>>;
}

/// Speaks the JSON auth contract over a raw transport. The transport must not be the
/// intercepted client, or a refresh could recurse into itself.
pub struct HttpAuthProvider {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
}

impl HttpAuthProvider {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints) -> Self { Self { transport, endpoints } }

    async fn post(&self, path: &str, body: serde_json::Value) -> AuthResult<ApiResponse> {
        let mut req = ApiRequest::post(path);
        req.body = Some(body);
        let resp = self.transport.send(req).await?;
        debug!(target: "sessionguard::provider", "POST {} -> {}", path, resp.status);
        Ok(resp)
    }
}

impl AuthProvider for HttpAuthProvider {
    fn login<'a>(&'a self, req: &'a LoginRequest) -> BoxFuture<'a, AuthResult<LoginResponse>> {
        async move {
            let body = serde_json::json!({"username": req.username, "password": req.password});
            let resp = self.post(&self.endpoints.login, body).await?;
            if !resp.is_success() {
                return Err(AuthError::login_failed(format!("HTTP {}", resp.status)));
            }
            resp.json::<LoginResponse>().map_err(|e| AuthError::login_failed(e.to_string()))
        }
        .boxed()
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, AuthResult<TokenPair>> {
        async move {
            let resp = self.post(&self.endpoints.refresh, serde_json::json!({"refreshToken": refresh_token})).await?;
            if !resp.is_success() {
                return Err(AuthError::refresh_failed(format!("HTTP {}", resp.status)));
            }
            resp.json::<TokenPair>().map_err(|e| AuthError::refresh_failed(e.to_string()))
        }
        .boxed()
    }

    fn logout<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, AuthResult<()>> {
        async move {
            let resp = self.post(&self.endpoints.logout, serde_json::json!({"refreshToken": refresh_token})).await?;
            if !resp.is_success() {
                return Err(AuthError::network(format!("logout returned HTTP {}", resp.status)));
            }
            Ok(())
        }
        .boxed()
    }

    fn register<'a>(&'a self, req: &'a RegisterRequest) -> BoxFuture<'a, AuthResult<serde_json::Value>> {
        async move {
            let body = serde_json::to_value(req).map_err(|e| AuthError::login_failed(e.to_string()))?;
            let resp = self.post(&self.endpoints.register, body).await?;
            if !resp.is_success() {
                return Err(AuthError::login_failed(format!("registration rejected: HTTP {}", resp.status)));
            }
            if resp.body.is_empty() { return Ok(serde_json::Value::Null); }
            resp.json::<serde_json::Value>().map_err(|e| AuthError::login_failed(e.to_string()))
        }
        .boxed()
    }
}
