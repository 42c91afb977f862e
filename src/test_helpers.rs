//! Scripted in-memory backend shared by the session, pipeline and resource tests.
//!
//! `MockBackend` behaves like the real auth API: it issues numbered token
//! pairs on login/refresh, accepts any issued access token until
//! `expire_access_tokens`, and echoes authenticated calls to other paths.
//! Per-path scripted outcomes take precedence over that behavior.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use crate::config::{AuthPaths, RefreshMode};
use crate::credentials::{Credentials, MemoryTokenStore, TokenStore};
use crate::error::RawFailure;
use crate::pipeline::RequestPipeline;
use crate::session::SessionController;
use crate::transport::{ApiRequest, ApiResponse, Transport};

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";

pub fn login_body() -> Value {
    json!({ "username": USERNAME, "password": PASSWORD })
}

pub fn user_json() -> Value {
    json!({ "id": 1, "username": USERNAME, "is_superuser": true, "roles": ["admin"] })
}

pub fn unauthorized() -> RawFailure {
    RawFailure::Response { status: 401, body: json!({ "detail": "Could not validate credentials" }) }
}

pub fn ok(body: Value) -> Result<ApiResponse, RawFailure> {
    Ok(ApiResponse { status: 200, body })
}

#[derive(Default)]
struct BackendState {
    issued: u32,
    valid_access: HashSet<String>,
    refresh_token: Option<String>,
    rotate_refresh: bool,
    refresh_failure: Option<RawFailure>,
    logout_failure: Option<RawFailure>,
    scripted: HashMap<String, VecDeque<Result<ApiResponse, RawFailure>>>,
    requests: Vec<ApiRequest>,
}

impl BackendState {
    fn issue_access(&mut self) -> String {
        self.issued += 1;
        let token = format!("access-{}", self.issued);
        self.valid_access.insert(token.clone());
        token
    }

    fn issue_refresh(&mut self) -> String {
        let token = format!("refresh-{}", self.issued);
        self.refresh_token = Some(token.clone());
        token
    }

    fn require_auth(&self, request: &ApiRequest) -> Result<(), RawFailure> {
        match request.bearer() {
            Some(token) if self.valid_access.contains(token) => Ok(()),
            _ => Err(unauthorized()),
        }
    }

    fn login(&mut self, request: &ApiRequest) -> Result<ApiResponse, RawFailure> {
        if request.body.as_ref() != Some(&login_body()) {
            return Err(RawFailure::Response {
                status: 401,
                body: json!({ "detail": "Incorrect username or password" }),
            });
        }
        let access = self.issue_access();
        let refresh = self.issue_refresh();
        ok(json!({ "access_token": access, "refresh_token": refresh, "token_type": "bearer" }))
    }

    fn refresh(&mut self, request: &ApiRequest) -> Result<ApiResponse, RawFailure> {
        if let Some(failure) = self.refresh_failure.clone() {
            return Err(failure);
        }
        let presented = request.body.as_ref().and_then(|b| b.get("refresh_token")).and_then(Value::as_str);
        if presented.is_none() || presented != self.refresh_token.as_deref() {
            return Err(RawFailure::Response { status: 401, body: json!({ "detail": "Invalid refresh token" }) });
        }
        let access = self.issue_access();
        if self.rotate_refresh {
            let refresh = self.issue_refresh();
            ok(json!({ "access_token": access, "refresh_token": refresh }))
        } else {
            ok(json!({ "access_token": access }))
        }
    }
}

pub struct MockBackend {
    state: Mutex<BackendState>,
    paths: AuthPaths,
    latency: Duration,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(BackendState::default()), paths: AuthPaths::default(), latency })
    }

    pub fn paths(&self) -> &AuthPaths {
        &self.paths
    }

    pub fn rotate_refresh_tokens(&self, rotate: bool) {
        self.state.lock().unwrap().rotate_refresh = rotate;
    }

    pub fn fail_refresh(&self, failure: RawFailure) {
        self.state.lock().unwrap().refresh_failure = Some(failure);
    }

    pub fn fail_logout(&self, failure: RawFailure) {
        self.state.lock().unwrap().logout_failure = Some(failure);
    }

    /// Queue an outcome for the next call to `path`.
    pub fn script(&self, path: &str, outcome: Result<ApiResponse, RawFailure>) {
        self.state.lock().unwrap().scripted.entry(path.to_owned()).or_default().push_back(outcome);
    }

    pub fn expire_access_tokens(&self) {
        self.state.lock().unwrap().valid_access.clear();
    }

    /// Issue a token pair out of band, as if a previous process had logged in.
    pub fn issue_session(&self) -> Credentials {
        let mut state = self.state.lock().unwrap();
        let access = state.issue_access();
        let refresh = state.issue_refresh();
        Credentials::new(Some(access), Some(refresh))
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    pub fn refresh_calls(&self) -> usize {
        self.calls_to(&self.paths.refresh)
    }
}

#[async_trait::async_trait]
impl Transport for MockBackend {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, RawFailure> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        if let Some(outcome) = state.scripted.get_mut(&request.path).and_then(VecDeque::pop_front) {
            return outcome;
        }

        let path = request.path.as_str();
        if path == self.paths.login {
            state.login(request)
        } else if path == self.paths.refresh {
            state.refresh(request)
        } else if path == self.paths.me {
            state.require_auth(request)?;
            ok(user_json())
        } else if path == self.paths.logout {
            match state.logout_failure.clone() {
                Some(failure) => Err(failure),
                None => ok(Value::Null),
            }
        } else {
            state.require_auth(request)?;
            ok(json!({
                "method": request.method.as_str(),
                "path": request.path,
                "token": request.bearer(),
                "body": request.body,
            }))
        }
    }
}

pub fn controller(backend: &Arc<MockBackend>, store: Arc<dyn TokenStore>, mode: RefreshMode) -> Arc<SessionController> {
    Arc::new(SessionController::new(backend.clone(), store, AuthPaths::default(), mode))
}

pub fn pipeline(backend: &Arc<MockBackend>, mode: RefreshMode) -> (Arc<RequestPipeline>, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new());
    let session = controller(backend, store.clone(), mode);
    (Arc::new(RequestPipeline::new(backend.clone(), session)), store)
}
