//! Transport seam: request/response values and the HTTP adapter.
//!
//! DESIGN
//! ======
//! The pipeline never touches reqwest directly. It hands an `ApiRequest` to a
//! `Transport`, which reports either a 2xx `ApiResponse` or a `RawFailure`.
//! `HttpTransport` is the production adapter; tests substitute scripted
//! transports.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

pub use reqwest::Method;

use crate::config::{ClientConfig, ConfigError, Timeouts};
use crate::error::{ApiError, RawFailure, normalize};

// =============================================================================
// REQUEST
// =============================================================================

/// One outbound call. Kept intact after a 401 so it can be replayed.
#[derive(Clone)]
pub struct ApiRequest {
    pub id: Uuid,
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    bearer: Option<String>,
    retried: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            bearer: None,
            retried: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Bearer token the request will carry, if any.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// Whether this request has already been replayed after a refresh.
    #[must_use]
    pub fn retried(&self) -> bool {
        self.retried
    }

    /// Set (or drop) the bearer credential. Empty tokens send unauthenticated.
    pub(crate) fn attach_token(&mut self, token: Option<&str>) {
        self.bearer = token.filter(|t| !t.is_empty()).map(str::to_owned);
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("authenticated", &self.bearer.is_some())
            .field("retried", &self.retried)
            .finish()
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// A successful (2xx) response. Non-JSON bodies arrive as `Value::String`,
/// empty bodies as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// Deserialize the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns a normalized error if the body does not have the expected shape.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.body).map_err(|e| {
            normalize(&RawFailure::Request { description: Some(format!("malformed response: {e}")) })
        })
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. 2xx responses are `Ok`; every other outcome,
    /// including non-2xx responses, is a `RawFailure`.
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, RawFailure>;
}

/// reqwest-backed transport bound to one backend base URL.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(base_url: &str, timeouts: Timeouts) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| ConfigError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        Self::new(&config.base_url, config.timeouts)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, RawFailure> {
        let mut builder = self.http.request(request.method.clone(), self.url(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = request.bearer() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(send_failure)?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RawFailure::NoResponse { reason: e.to_string() })?;
        let body = parse_body(&text);

        if (200..300).contains(&status) {
            Ok(ApiResponse { status, body })
        } else {
            Err(RawFailure::Response { status, body })
        }
    }
}

fn send_failure(e: reqwest::Error) -> RawFailure {
    if e.is_builder() {
        RawFailure::Request { description: Some(e.to_string()) }
    } else {
        RawFailure::NoResponse { reason: e.to_string() }
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => Value::String(text.to_owned()),
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
