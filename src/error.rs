//! API error taxonomy and the failure normalizer.
//!
//! DESIGN
//! ======
//! Every failure that leaves the request pipeline is an `ApiError`. Transport
//! adapters only describe what went wrong as a `RawFailure`; `normalize` is the
//! single place that turns one into the other, so callers see one shape no
//! matter how the backend phrased its complaint.
//!
//! BACKEND SHAPES
//! ==============
//! The backend reports errors as `{"detail": "..."}`, as FastAPI-style
//! validation lists `{"detail": [{"loc": [...], "msg": "..."}]}`, as a bare
//! JSON string, or as `{"message": "..."}`. Anything else gets the generic
//! message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MESSAGE: &str = "An error occurred";
pub const NETWORK_MESSAGE: &str = "Network error - please check your connection";
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred";
pub const NO_REFRESH_TOKEN_MESSAGE: &str = "No refresh token available";
pub const SESSION_ENDED_MESSAGE: &str = "Session ended before the request completed";

const FIELD_PLACEHOLDER: &str = "Field";

// =============================================================================
// RAW FAILURE
// =============================================================================

/// A failure as observed by a transport, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// The backend answered with a non-success status.
    Response { status: u16, body: Value },
    /// No response arrived: connect error, timeout, or a dropped connection.
    NoResponse { reason: String },
    /// The request could not be built, or the response could not be read.
    Request { description: Option<String> },
}

impl RawFailure {
    /// HTTP status of the failure, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            Self::NoResponse { .. } | Self::Request { .. } => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

// =============================================================================
// TAXONOMY
// =============================================================================

/// Classification of a normalized failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 4xx carrying field-level validation entries (or a 422).
    Validation,
    /// 401 after the retry was consumed, a failed refresh, or no refresh token.
    Authentication,
    /// Any other 4xx rejection.
    Client,
    /// 5xx, even when the body carries field errors; those stay in `errors`.
    Server,
    /// No response received.
    Network,
    /// Request construction failures, malformed responses, unexpected statuses.
    Unknown,
}

/// One field-level validation entry as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub loc: Vec<Value>,
    #[serde(default)]
    pub msg: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl FieldError {
    /// The offending field: the last element of `loc`.
    #[must_use]
    pub fn field(&self) -> Option<String> {
        match self.loc.last()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn from_entry(entry: &Value) -> Self {
        match entry {
            Value::Object(map) => Self {
                loc: map.get("loc").and_then(Value::as_array).cloned().unwrap_or_default(),
                msg: map.get("msg").and_then(Value::as_str).unwrap_or_default().to_owned(),
                kind: map.get("type").and_then(Value::as_str).map(str::to_owned),
            },
            Value::String(s) => Self { loc: Vec::new(), msg: s.clone(), kind: None },
            other => Self { loc: Vec::new(), msg: other.to_string(), kind: None },
        }
    }

    fn render(&self) -> String {
        let field = self.field().unwrap_or_else(|| FIELD_PLACEHOLDER.to_owned());
        format!("{field}: {}", self.msg)
    }
}

// =============================================================================
// API ERROR
// =============================================================================

/// The one error shape handed to callers of the pipeline and the session.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status, or 0 when no response was received.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ApiError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>, status: u16) -> Self {
        Self { kind, message: message.into(), status, detail: None, errors: None }
    }

    /// Returned by a refresh attempt when no refresh token is held.
    #[must_use]
    pub fn no_refresh_token() -> Self {
        Self::new(ErrorKind::Authentication, NO_REFRESH_TOKEN_MESSAGE, 0)
    }

    /// Returned when a logout or failed refresh cleared the session while
    /// this call was in flight.
    #[must_use]
    pub fn session_ended() -> Self {
        Self::new(ErrorKind::Authentication, SESSION_ENDED_MESSAGE, 0)
    }

    /// Reclassify as an authentication failure, keeping message and status.
    #[must_use]
    pub fn into_authentication(mut self) -> Self {
        self.kind = ErrorKind::Authentication;
        self
    }

    #[must_use]
    pub fn is_authentication(&self) -> bool {
        self.kind == ErrorKind::Authentication
    }

    /// Whether repeating the same call later might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Network | ErrorKind::Server)
    }

    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self.kind {
            ErrorKind::Validation => "E_VALIDATION",
            ErrorKind::Authentication => "E_AUTHENTICATION",
            ErrorKind::Client => "E_CLIENT",
            ErrorKind::Server => "E_SERVER",
            ErrorKind::Network => "E_NETWORK",
            ErrorKind::Unknown => "E_UNKNOWN",
        }
    }
}

// =============================================================================
// NORMALIZER
// =============================================================================

/// Map any transport or backend failure to an `ApiError`. Pure.
#[must_use]
pub fn normalize(failure: &RawFailure) -> ApiError {
    match failure {
        RawFailure::Response { status, body } => normalize_response(*status, body),
        RawFailure::NoResponse { .. } => ApiError::new(ErrorKind::Network, NETWORK_MESSAGE, 0),
        RawFailure::Request { description } => {
            let message = match description.as_deref() {
                Some(d) if !d.is_empty() => d.to_owned(),
                _ => UNEXPECTED_MESSAGE.to_owned(),
            };
            ApiError::new(ErrorKind::Unknown, message, 0)
        }
    }
}

fn normalize_response(status: u16, body: &Value) -> ApiError {
    let detail = body.get("detail").filter(|d| !d.is_null());

    let mut errors = None;
    let message = match detail {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(entries)) if !entries.is_empty() => {
            let parsed: Vec<FieldError> = entries.iter().map(FieldError::from_entry).collect();
            let joined = parsed.iter().map(FieldError::render).collect::<Vec<_>>().join(", ");
            errors = Some(parsed);
            joined
        }
        _ => fallback_message(body),
    };

    ApiError {
        kind: classify(status, errors.is_some()),
        message,
        status,
        detail: detail.cloned(),
        errors,
    }
}

fn fallback_message(body: &Value) -> String {
    if let Value::String(s) = body {
        return s.clone();
    }
    match body.get("message").and_then(Value::as_str) {
        Some(m) => m.to_owned(),
        None => DEFAULT_MESSAGE.to_owned(),
    }
}

fn classify(status: u16, has_field_errors: bool) -> ErrorKind {
    match status {
        401 => ErrorKind::Authentication,
        422 => ErrorKind::Validation,
        400..=499 if has_field_errors => ErrorKind::Validation,
        400..=499 => ErrorKind::Client,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Unknown,
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
