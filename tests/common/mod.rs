//! Shared fixtures: a scripted in-process auth/API server implementing `Transport`
//! and helpers to build sessions around it.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::json;

use sessionguard::client::{ApiRequest, ApiResponse, AuthenticatedClient, TimeoutTransport, Transport};
use sessionguard::identity::{encode_unsigned, AuthSession, Credentials, CredentialStore, HttpAuthProvider, MemoryCredentialStore, UserProfile};
use sessionguard::{Endpoints, TransportError};

#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

pub struct Reply {
    pub delay: Option<Duration>,
    pub result: Result<ApiResponse, TransportError>,
}

impl Reply {
    pub fn json(status: u16, v: serde_json::Value) -> Self { Self { delay: None, result: Ok(ApiResponse::json_body(status, &v)) } }
    pub fn status(status: u16) -> Self { Self { delay: None, result: Ok(ApiResponse::new(status, Vec::new())) } }
    pub fn fail(err: TransportError) -> Self { Self { delay: None, result: Err(err) } }
    pub fn after(mut self, d: Duration) -> Self { self.delay = Some(d); self }
}

type Handler = Box<dyn Fn(&Call) -> Reply + Send + Sync>;

/// Records every call and answers from a closure.
pub struct MockServer {
    log: Mutex<Vec<Call>>,
    handler: Handler,
}

impl MockServer {
    pub fn new(handler: impl Fn(&Call) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { log: Mutex::new(Vec::new()), handler: Box::new(handler) })
    }

    pub fn calls(&self) -> Vec<Call> { self.log.lock().clone() }

    pub fn count(&self, path: &str) -> usize { self.log.lock().iter().filter(|c| c.path == path).count() }
}

impl Transport for MockServer {
    fn send(&self, req: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>> {
        let call = Call {
            method: req.method.to_string(),
            path: req.path.clone(),
            bearer: req.bearer().map(str::to_string),
            body: req.body.clone(),
        };
        sessionguard::tprintln!("mock: {} {} bearer={}", call.method, call.path, call.bearer.is_some());
        self.log.lock().push(call.clone());
        let reply = (self.handler)(&call);
        async move {
            if let Some(d) = reply.delay {
                tokio::time::sleep(d).await;
            }
            reply.result
        }
        .boxed()
    }
}

/// Unsigned compact token for `sub` expiring `expires_in` seconds from now.
pub fn token(sub: &str, expires_in: i64) -> String {
    encode_unsigned(&json!({"sub": sub, "exp": Utc::now().timestamp() + expires_in, "jti": uuid::Uuid::new_v4().to_string()}))
}

pub fn signed_in(access: &str, refresh: &str) -> Credentials {
    let mut c = Credentials::empty().with_tokens(access.into(), refresh.into());
    c.user = Some(UserProfile { id: "u-1".into(), user_name: "ada".into(), email: "ada@example.test".into() });
    c.roles.insert("admin".into());
    c.roles.insert("judge".into());
    c.permissions.insert("events.read".into());
    c
}

pub struct Harness {
    pub server: Arc<MockServer>,
    pub store: Arc<MemoryCredentialStore>,
    pub session: Arc<AuthSession>,
    pub client: AuthenticatedClient,
}

pub fn harness(server: Arc<MockServer>, initial: Credentials) -> Harness {
    harness_with_timeout(server, initial, Duration::from_secs(30))
}

pub fn harness_with_timeout(server: Arc<MockServer>, initial: Credentials, timeout: Duration) -> Harness {
    sessionguard::logging::init("sessionguard=debug");
    let store = Arc::new(MemoryCredentialStore::with(initial));
    let transport: Arc<dyn Transport> = Arc::new(TimeoutTransport::new(server.clone(), timeout));
    let endpoints = Endpoints::default();
    let provider = Arc::new(HttpAuthProvider::new(transport.clone(), endpoints.clone()));
    let session = AuthSession::new(store.clone(), provider, Duration::from_secs(60));
    let client = AuthenticatedClient::new(transport, session.clone(), endpoints);
    Harness { server, store, session, client }
}

pub fn stored(store: &MemoryCredentialStore) -> Credentials { store.load() }
