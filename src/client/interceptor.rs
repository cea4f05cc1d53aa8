use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};

use super::transport::{default_transport, ApiRequest, ApiResponse, Transport};
use crate::config::{ClientConfig, Endpoints};
use crate::error::{AuthError, ClientError};
use crate::identity::{AuthSession, FileCredentialStore, HttpAuthProvider};

/// Wraps a transport with bearer injection and a single refresh-and-retry on 401.
#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    session: Arc<AuthSession>,
    endpoints: Endpoints,
}

impl AuthenticatedClient {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<AuthSession>, endpoints: Endpoints) -> Self {
        Self { transport, session, endpoints }
    }

    /// Wire up the default stack: reqwest transport with timeout, file-backed credentials,
    /// HTTP auth provider, and a session restored from disk.
    pub fn from_config(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let transport = default_transport(cfg).context("building HTTP transport")?;
        let store = Arc::new(FileCredentialStore::open(&cfg.credentials_path));
        let provider = Arc::new(HttpAuthProvider::new(transport.clone(), cfg.endpoints.clone()));
        let session = AuthSession::with_profile_path(store, provider, cfg.expiry_skew(), &cfg.endpoints.profile);
        info!(target: "sessionguard::client", "client ready: base_url={} state={:?}", cfg.base_url, session.state());
        Ok(Self::new(transport, session, cfg.endpoints.clone()))
    }

    pub fn session(&self) -> &Arc<AuthSession> { &self.session }

    pub async fn send(&self, mut req: ApiRequest) -> Result<ApiResponse, ClientError> {
        // auth endpoints go out untouched, or a refresh could trigger itself
        if self.endpoints.is_unauthenticated(&req.path) {
            return Ok(self.transport.send(req).await?);
        }

        if let Some(token) = self.session.ensure_valid_token().await {
            req.set_bearer(&token)?;
        }
        let resp = self.transport.send(req.clone()).await?;
        if !resp.is_unauthorized() || req.retried {
            return Ok(resp);
        }

        if !self.session.is_authenticated() {
            // anonymous call, or the session ended while the request was out
            return Ok(resp);
        }
        req.retried = true;
        debug!(target: "sessionguard::client", "{} {} -> 401, refreshing and retrying once", req.method, req.path);
        let coordinator = self.session.coordinator();
        let refreshed = match req.bearer().map(str::to_string) {
            Some(t) => coordinator.refresh_after_rejection(&t).await,
            None => coordinator.refresh().await,
        };
        let token = match refreshed {
            Ok(t) => t,
            Err(AuthError::NoRefreshToken | AuthError::SessionEnded) if !self.session.is_authenticated() => {
                debug!(target: "sessionguard::client", "session ended during {} {}, returning the 401", req.method, req.path);
                return Ok(resp);
            }
            Err(e) => return Err(e.into()),
        };
        req.set_bearer(&token)?;
        // whatever comes back now, including a second 401, goes to the caller as is
        Ok(self.transport.send(req).await?)
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse, ClientError> {
        self.send(ApiRequest::post(path).json(body)?).await
    }
}
