use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/events?page=2`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    pub(crate) retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HeaderMap::new(), body: None, retried: false }
    }
    pub fn get(path: impl Into<String>) -> Self { Self::new(Method::GET, path) }
    pub fn post(path: impl Into<String>) -> Self { Self::new(Method::POST, path) }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, TransportError> {
        self.body = Some(serde_json::to_value(body).map_err(|e| TransportError::Body(e.to_string()))?);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn set_bearer(&mut self, token: &str) -> Result<(), TransportError> {
        let mut v = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| TransportError::Request(format!("invalid bearer token: {}", e)))?;
        v.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, v);
        Ok(())
    }

    pub fn bearer(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
    }

    pub fn is_retry(&self) -> bool { self.retried }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into() }
    }
    pub fn json_body(status: u16, v: &serde_json::Value) -> Self { Self::new(status, v.to_string()) }

    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
    pub fn is_unauthorized(&self) -> bool { self.status == 401 }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Body(e.to_string()))
    }
}

/// Dispatches a request and reports the status. Non-2xx statuses are responses, not errors.
pub trait Transport: Send + Sync {
    fn send(&self, req: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    base: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(cfg: &ClientConfig) -> Result<Self, TransportError> {
        let base = Url::parse(&cfg.base_url).map_err(|e| TransportError::Request(format!("invalid base URL: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;
        Ok(Self { base, client, timeout: cfg.request_timeout() })
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        // keep any path prefix on the base (e.g. `/api`), unlike Url::join with a leading slash
        let joined = format!("{}/{}", self.base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| TransportError::Request(e.to_string()))
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, req: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>> {
        async move {
            let url = self.url_for(&req.path)?;
            let mut builder = self.client.request(req.method.clone(), url).headers(req.headers);
            if let Some(body) = &req.body {
                builder = builder.json(body);
            }
            let resp = builder.send().await.map_err(|e| {
                if e.is_timeout() { TransportError::Timeout(self.timeout) } else { e.into() }
            })?;
            let status = resp.status().as_u16();
            let headers = resp.headers().clone();
            let body = resp.bytes().await?.to_vec();
            tracing::debug!(target: "sessionguard::client", "{} {} -> {}", req.method, req.path, status);
            Ok(ApiResponse { status, headers, body })
        }
        .boxed()
    }
}

/// Bounds every call on the wrapped transport; a hung call fails with `Timeout`.
pub struct TimeoutTransport {
    inner: Arc<dyn Transport>,
    timeout: Duration,
}

impl TimeoutTransport {
    pub fn new(inner: Arc<dyn Transport>, timeout: Duration) -> Self { Self { inner, timeout } }
}

impl Transport for TimeoutTransport {
    fn send(&self, req: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>> {
        async move {
            match tokio::time::timeout(self.timeout, self.inner.send(req)).await {
                Ok(res) => res,
                Err(_) => Err(TransportError::Timeout(self.timeout)),
            }
        }
        .boxed()
    }
}

/// The transport stack used by default: reqwest with a hard per-call timeout on top.
pub fn default_transport(cfg: &ClientConfig) -> Result<Arc<dyn Transport>, TransportError> {
    let raw: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(cfg)?);
    Ok(Arc::new(TimeoutTransport::new(raw, cfg.request_timeout())))
}
