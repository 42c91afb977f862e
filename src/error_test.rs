use super::*;
use serde_json::json;

fn response(status: u16, body: Value) -> RawFailure {
    RawFailure::Response { status, body }
}

// =============================================================================
// structured responses
// =============================================================================

#[test]
fn string_detail_becomes_message() {
    let err = normalize(&response(400, json!({ "detail": "Email already registered" })));
    assert_eq!(err.message, "Email already registered");
    assert_eq!(err.status, 400);
    assert_eq!(err.kind, ErrorKind::Client);
    assert_eq!(err.detail, Some(json!("Email already registered")));
    assert!(err.errors.is_none());
}

#[test]
fn validation_list_names_the_field() {
    let err = normalize(&response(
        422,
        json!({ "detail": [{ "loc": ["body", "email"], "msg": "invalid format" }] }),
    ));
    assert_eq!(err.status, 422);
    assert_eq!(err.message, "email: invalid format");
    assert_eq!(err.kind, ErrorKind::Validation);
    let errors = err.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field().as_deref(), Some("email"));
}

#[test]
fn validation_list_joins_entries_in_order() {
    let err = normalize(&response(
        422,
        json!({ "detail": [
            { "loc": ["body", "email"], "msg": "invalid format", "type": "value_error" },
            { "loc": ["body", "password"], "msg": "too short" }
        ] }),
    ));
    assert_eq!(err.message, "email: invalid format, password: too short");
    let errors = err.errors.unwrap();
    assert_eq!(errors[0].kind.as_deref(), Some("value_error"));
    assert_eq!(errors[1].msg, "too short");
}

#[test]
fn server_error_with_field_list_stays_server() {
    let err = normalize(&response(
        500,
        json!({ "detail": [{ "loc": ["body", "email"], "msg": "lookup failed" }] }),
    ));
    assert_eq!(err.kind, ErrorKind::Server);
    assert!(err.is_retryable());
    assert_eq!(err.message, "email: lookup failed");
    assert_eq!(err.errors.map(|e| e.len()), Some(1));
}

#[test]
fn session_ended_error_shape() {
    let err = ApiError::session_ended();
    assert_eq!(err.message, SESSION_ENDED_MESSAGE);
    assert_eq!(err.status, 0);
    assert!(err.is_authentication());
}

#[test]
fn validation_entry_without_loc_uses_placeholder() {
    let err = normalize(&response(400, json!({ "detail": [{ "msg": "required" }] })));
    assert_eq!(err.message, "Field: required");
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[test]
fn validation_entry_with_numeric_loc() {
    let err = normalize(&response(422, json!({ "detail": [{ "loc": ["body", "items", 2], "msg": "bad" }] })));
    assert_eq!(err.message, "2: bad");
}

#[test]
fn plain_string_body() {
    let err = normalize(&response(502, json!("Bad Gateway")));
    assert_eq!(err.message, "Bad Gateway");
    assert_eq!(err.kind, ErrorKind::Server);
    assert!(err.detail.is_none());
}

#[test]
fn message_field_used_when_no_detail() {
    let err = normalize(&response(403, json!({ "message": "Forbidden for role" })));
    assert_eq!(err.message, "Forbidden for role");
    assert_eq!(err.kind, ErrorKind::Client);
}

#[test]
fn object_detail_falls_through_to_message_field() {
    let err = normalize(&response(409, json!({ "detail": { "code": 7 }, "message": "conflict" })));
    assert_eq!(err.message, "conflict");
    assert_eq!(err.detail, Some(json!({ "code": 7 })));
}

#[test]
fn unrecognized_body_gets_default_message() {
    let err = normalize(&response(500, json!({ "trace": "..." })));
    assert_eq!(err.message, DEFAULT_MESSAGE);
    assert_eq!(err.status, 500);
    assert_eq!(err.kind, ErrorKind::Server);
}

#[test]
fn null_body_gets_default_message() {
    let err = normalize(&response(404, Value::Null));
    assert_eq!(err.message, DEFAULT_MESSAGE);
    assert_eq!(err.kind, ErrorKind::Client);
}

#[test]
fn unauthorized_is_authentication() {
    let err = normalize(&response(401, json!({ "detail": "Could not validate credentials" })));
    assert_eq!(err.kind, ErrorKind::Authentication);
    assert!(err.is_authentication());
    assert_eq!(err.error_code(), "E_AUTHENTICATION");
}

// =============================================================================
// no response / request failures
// =============================================================================

#[test]
fn timeout_is_network_error() {
    let err = normalize(&RawFailure::NoResponse { reason: "operation timed out".into() });
    assert_eq!(err.status, 0);
    assert_eq!(err.message, "Network error - please check your connection");
    assert_eq!(err.kind, ErrorKind::Network);
    assert!(err.is_retryable());
}

#[test]
fn request_failure_keeps_description() {
    let err = normalize(&RawFailure::Request { description: Some("invalid header value".into()) });
    assert_eq!(err.message, "invalid header value");
    assert_eq!(err.status, 0);
    assert_eq!(err.kind, ErrorKind::Unknown);
    assert!(!err.is_retryable());
}

#[test]
fn request_failure_without_description() {
    let err = normalize(&RawFailure::Request { description: None });
    assert_eq!(err.message, UNEXPECTED_MESSAGE);
    let err = normalize(&RawFailure::Request { description: Some(String::new()) });
    assert_eq!(err.message, UNEXPECTED_MESSAGE);
}

// =============================================================================
// purity and helpers
// =============================================================================

#[test]
fn normalize_is_idempotent() {
    let failure = response(422, json!({ "detail": [{ "loc": ["body", "name"], "msg": "missing" }] }));
    assert_eq!(normalize(&failure), normalize(&failure));
    let failure = RawFailure::NoResponse { reason: "reset".into() };
    assert_eq!(normalize(&failure), normalize(&failure));
}

#[test]
fn display_is_message() {
    let err = ApiError::new(ErrorKind::Client, "nope", 400);
    assert_eq!(err.to_string(), "nope");
}

#[test]
fn into_authentication_keeps_message_and_status() {
    let err = normalize(&RawFailure::NoResponse { reason: "down".into() }).into_authentication();
    assert_eq!(err.kind, ErrorKind::Authentication);
    assert_eq!(err.message, NETWORK_MESSAGE);
    assert_eq!(err.status, 0);
}

#[test]
fn no_refresh_token_error_shape() {
    let err = ApiError::no_refresh_token();
    assert_eq!(err.message, "No refresh token available");
    assert!(err.is_authentication());
}

#[test]
fn raw_failure_status_helpers() {
    assert!(response(401, Value::Null).is_unauthorized());
    assert!(!response(403, Value::Null).is_unauthorized());
    assert_eq!(RawFailure::NoResponse { reason: String::new() }.status(), None);
}

#[test]
fn api_error_serializes_without_empty_optionals() {
    let json = serde_json::to_value(ApiError::new(ErrorKind::Network, NETWORK_MESSAGE, 0)).unwrap();
    assert_eq!(json, json!({ "kind": "network", "message": NETWORK_MESSAGE, "status": 0 }));
}
