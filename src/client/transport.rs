use std::future::Future;

use reqwest::{Method, Url};
use serde_json::Value;

use crate::config::ApiConfig;
use crate::error::{AppError, AppResult};

const DEFAULT_ERROR_MESSAGE: &str = "Something went wrong";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid backend base URL '{0}': {1}")]
    InvalidBaseUrl(String, String),
    #[error("invalid request path '{0}'")]
    InvalidPath(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http(e) => AppError::from(e),
            other => AppError::Internal { code: "transport_config".into(), message: other.to_string() },
        }
    }
}

/// One outbound backend call, in the shape UI code issues it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Access credential sent as `Authorization: Bearer ...`.
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, bearer: None }
    }

    pub fn get(path: impl Into<String>) -> Self { Self::new(Method::GET, path) }
    pub fn post(path: impl Into<String>, body: Value) -> Self { Self::new(Method::POST, path).with_body(body) }
    pub fn patch(path: impl Into<String>, body: Value) -> Self { Self::new(Method::PATCH, path).with_body(body) }
    pub fn put(path: impl Into<String>, body: Value) -> Self { Self::new(Method::PUT, path).with_body(body) }
    pub fn delete(path: impl Into<String>) -> Self { Self::new(Method::DELETE, path) }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_bearer(mut self, bearer: Option<String>) -> Self {
        self.bearer = bearer;
        self
    }

    /// Path without query string, for comparing against well-known endpoints.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self { Self { status, body } }

    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

    pub fn is_authorization_failure(&self) -> bool { self.status == 401 }

    /// The `data` member of the backend envelope, or the whole body when the
    /// backend answered without an envelope.
    pub fn data(&self) -> &Value {
        self.body.get("data").unwrap_or(&self.body)
    }

    pub fn message(&self) -> Option<String> { error_message(&self.body) }

    /// `Ok(self)` for 2xx, otherwise the classified error.
    pub fn into_result(self) -> AppResult<ApiResponse> {
        if self.is_success() { Ok(self) } else { Err(error_for_status(&self)) }
    }
}

/// User-presentable message from a backend error body: `message`, else the
/// non-empty `errors[].message` values joined with ", ".
pub fn error_message(body: &Value) -> Option<String> {
    if let Some(m) = body.get("message").and_then(|m| m.as_str()).filter(|m| !m.is_empty()) {
        return Some(m.to_string());
    }
    let joined = body
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|errs| {
            errs.iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .filter(|m| !m.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    if joined.is_empty() { None } else { Some(joined) }
}

pub fn error_for_status(resp: &ApiResponse) -> AppError {
    let message = resp.message().unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
    match resp.status {
        401 => AppError::Unauthorized { code: "unauthorized".into(), message },
        403 => AppError::Forbidden { code: "forbidden".into(), message },
        404 => AppError::NotFound { code: "not_found".into(), message },
        s => AppError::Remote { code: format!("http_{}", s), message, status: s },
    }
}

/// Sends one request to the backend. Non-2xx statuses are responses, not
/// errors; `Err` is reserved for failures to get a response at all.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: &ApiRequest) -> impl Future<Output = AppResult<ApiResponse>> + Send;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    base: Url,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(cfg: &ApiConfig) -> Result<Self, TransportError> {
        let base = Url::parse(&cfg.base_url)
            .map_err(|e| TransportError::InvalidBaseUrl(cfg.base_url.clone(), e.to_string()))?;
        let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self { base, client })
    }

    pub fn base(&self) -> &Url { &self.base }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> AppResult<ApiResponse> {
        let url = self
            .base
            .join(&request.path)
            .map_err(|_| TransportError::InvalidPath(request.path.clone()))?;
        let mut rb = self.client.request(request.method.clone(), url);
        if let Some(token) = &request.bearer {
            rb = rb.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            rb = rb.json(body);
        }
        let resp = rb.send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        tracing::trace!(target: "client", method = %request.method, path = %request.route(), status, "backend response");
        Ok(ApiResponse { status, body })
    }
}
