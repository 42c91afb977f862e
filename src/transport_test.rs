use super::*;
use serde_json::json;

// =============================================================================
// ApiRequest
// =============================================================================

#[test]
fn builders_set_method_and_path() {
    let req = ApiRequest::post("/api/v1/users")
        .with_body(json!({ "name": "ada" }))
        .with_query("page", "2")
        .with_header("x-trace", "abc");
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.path, "/api/v1/users");
    assert_eq!(req.body, Some(json!({ "name": "ada" })));
    assert_eq!(req.query, vec![("page".to_owned(), "2".to_owned())]);
    assert_eq!(req.headers, vec![("x-trace".to_owned(), "abc".to_owned())]);
    assert!(req.bearer().is_none());
    assert!(!req.retried());
}

#[test]
fn each_request_gets_its_own_id() {
    assert_ne!(ApiRequest::get("/a").id, ApiRequest::get("/a").id);
}

#[test]
fn attach_token_ignores_empty() {
    let mut req = ApiRequest::get("/x");
    req.attach_token(Some("tok"));
    assert_eq!(req.bearer(), Some("tok"));
    req.attach_token(Some(""));
    assert_eq!(req.bearer(), None);
    req.attach_token(None);
    assert_eq!(req.bearer(), None);
}

#[test]
fn debug_hides_bearer() {
    let mut req = ApiRequest::delete("/x");
    req.attach_token(Some("super-secret"));
    let debug = format!("{req:?}");
    assert!(!debug.contains("super-secret"));
    assert!(debug.contains("authenticated: true"));
}

// =============================================================================
// ApiResponse
// =============================================================================

#[derive(Debug, serde::Deserialize)]
struct Named {
    name: String,
}

#[test]
fn into_json_deserializes() {
    let resp = ApiResponse { status: 200, body: json!({ "name": "ada" }) };
    let named: Named = resp.into_json().unwrap();
    assert_eq!(named.name, "ada");
}

#[test]
fn into_json_reports_malformed_body() {
    let resp = ApiResponse { status: 200, body: json!([1, 2]) };
    let err = resp.into_json::<Named>().unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::Unknown);
    assert_eq!(err.status, 0);
    assert!(err.message.starts_with("malformed response"));
}

// =============================================================================
// HttpTransport helpers
// =============================================================================

#[test]
fn url_joins_base_and_path() {
    let transport = HttpTransport::new("http://localhost:8000/", Timeouts::default()).unwrap();
    assert_eq!(transport.url("/api/v1/users"), "http://localhost:8000/api/v1/users");
    assert_eq!(transport.url("api/v1/users"), "http://localhost:8000/api/v1/users");
    assert_eq!(transport.url("https://other.test/x"), "https://other.test/x");
}

#[test]
fn parse_body_variants() {
    assert_eq!(parse_body(""), Value::Null);
    assert_eq!(parse_body("  "), Value::Null);
    assert_eq!(parse_body(r#"{"a":1}"#), json!({ "a": 1 }));
    assert_eq!(parse_body("Internal Server Error"), json!("Internal Server Error"));
}
