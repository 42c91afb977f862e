//! Session controller: login, refresh, re-authentication, logout.
//!
//! STATE MACHINE
//! =============
//! `anonymous -> authenticating -> authenticated <-> refreshing`. Any failed
//! login or refresh drops straight back to `anonymous` with credentials
//! cleared. The controller is the only writer of both `Session` and the
//! `CredentialStore`.
//!
//! CONCURRENCY
//! ===========
//! `Session` and the `CredentialStore` change together: every credential
//! write happens while the `state` write lock is held, so no thread ever sees
//! `is_authenticated` without an access token. The lock is never held across
//! an await.
//!
//! Each clear bumps the session epoch. Login, refresh and `check_auth`
//! remember the epoch they started under and drop their result if a logout or
//! a failed refresh ended the session while they were awaiting the backend.
//!
//! In `RefreshMode::SingleFlight` refreshes pass through `refresh_gate`. A
//! caller whose rejected token has already been replaced takes the new token;
//! one whose rejected token already failed to refresh gets that same failure.
//! Only the caller that ran the exchange invalidates the session.
//! `RefreshMode::Independent` skips the gate, so N concurrent 401s cause N
//! refresh calls and the last credential write wins.
//!
//! Auth endpoint calls use the pipeline's attach/dispatch/normalize stages but
//! not its 401 interceptor; the controller handles its own refresh, which
//! keeps `check_auth` free of nested refreshes.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::config::{AuthPaths, RefreshMode};
use crate::credentials::{CredentialStore, Credentials, TokenStore};
use crate::error::{ApiError, RawFailure, normalize};
use crate::pipeline::dispatch;
use crate::transport::{ApiRequest, ApiResponse, Transport};

const EVENT_CAPACITY: usize = 32;

// =============================================================================
// SESSION STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
}

/// What route guards and screens read. `is_authenticated` implies an access
/// token is held.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    /// Current-user record as returned by the backend.
    pub user: Option<Value>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub phase: SessionPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// A 401 could not be recovered because the refresh failed.
    RefreshFailed,
    /// The embedding application asked for it.
    Requested,
}

/// Broadcast to subscribers. `Invalidated` means "send the user to login".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    LoggedOut,
    Invalidated { reason: InvalidationReason },
}

#[derive(Debug, Default)]
struct SessionCell {
    session: Session,
    /// Bumped every time the session is cleared.
    epoch: u64,
}

/// Last failed exchange, kept so callers queued behind it share its outcome.
struct FailedRefresh {
    /// Access token held when the exchange started.
    rejected: Option<String>,
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct SessionController {
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    state: RwLock<SessionCell>,
    paths: AuthPaths,
    refresh_mode: RefreshMode,
    refresh_gate: Mutex<Option<FailedRefresh>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        token_store: Arc<dyn TokenStore>,
        paths: AuthPaths,
        refresh_mode: RefreshMode,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            credentials: CredentialStore::new(token_store),
            state: RwLock::new(SessionCell::default()),
            paths,
            refresh_mode,
            refresh_gate: Mutex::new(None),
            events,
        }
    }

    /// Read-only view of the held tokens.
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.credentials.access_token()
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.read_state().session.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read_state().session.is_authenticated
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.read_state().session.is_loading
    }

    #[must_use]
    pub fn refresh_mode(&self) -> RefreshMode {
        self.refresh_mode
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // login
    // -------------------------------------------------------------------------

    /// Exchange credentials for tokens, then load the current user.
    ///
    /// # Errors
    ///
    /// Returns the normalized login or current-user failure. Credentials are
    /// cleared and the message is kept in `Session::last_error`.
    pub async fn login<C>(&self, credentials: &C) -> Result<Value, ApiError>
    where
        C: Serialize + Sync + ?Sized,
    {
        let body = serde_json::to_value(credentials)
            .map_err(|e| normalize(&RawFailure::Request { description: Some(e.to_string()) }))?;

        let epoch = {
            let mut cell = self.write_state();
            cell.session.phase = SessionPhase::Authenticating;
            cell.session.is_loading = true;
            cell.session.last_error = None;
            cell.epoch
        };

        match self.login_inner(epoch, body).await {
            Ok(user) => {
                info!("login succeeded");
                self.emit(SessionEvent::LoggedIn);
                Ok(user)
            }
            Err(err) => {
                warn!(error = %err, status = err.status, "login failed");
                self.end_session(Some(epoch), |s| s.last_error = Some(err.message.clone()));
                Err(err)
            }
        }
    }

    async fn login_inner(&self, epoch: u64, body: Value) -> Result<Value, ApiError> {
        let response = self.dispatch(ApiRequest::post(self.paths.login.clone()).with_body(body)).await?;
        let tokens = parse_tokens(response)?;
        let credentials = Credentials::new(Some(tokens.access_token), tokens.refresh_token);
        self.commit(epoch, Some(credentials), |_| {})?;

        let user = self.current_user().await?;
        self.commit(epoch, None, |s| {
            s.user = Some(user.clone());
            s.is_authenticated = true;
            s.is_loading = false;
            s.phase = SessionPhase::Authenticated;
        })?;
        Ok(user)
    }

    /// Fetch the current-user record with the held access token.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure; no refresh is attempted here.
    pub async fn current_user(&self) -> Result<Value, ApiError> {
        let response = self.dispatch(ApiRequest::get(self.paths.me.clone())).await?;
        Ok(response.body)
    }

    // -------------------------------------------------------------------------
    // refresh
    // -------------------------------------------------------------------------

    /// Obtain a new access token with the held refresh token.
    ///
    /// # Errors
    ///
    /// Fails immediately, leaving state untouched, when no refresh token is
    /// held. A failed refresh call clears credentials and session before the
    /// error is returned.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        self.exchange(None, None).await
    }

    /// Refresh on behalf of a request rejected while carrying `rejected`.
    /// On failure the session is invalidated by whichever caller ran the
    /// exchange; callers that joined it only get the error.
    pub(crate) async fn refresh_for_retry(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        self.exchange(rejected, Some(InvalidationReason::RefreshFailed)).await
    }

    async fn exchange(
        &self,
        rejected: Option<&str>,
        on_failure: Option<InvalidationReason>,
    ) -> Result<String, ApiError> {
        if self.refresh_mode == RefreshMode::Independent {
            return self.refresh_now(on_failure).await;
        }

        let mut last_failure = self.refresh_gate.lock().await;
        if let Some(rejected) = rejected {
            if let Some(current) = self.credentials.access_token().filter(|t| t != rejected) {
                debug!("token already replaced by a concurrent refresh");
                return Ok(current);
            }
            if let Some(failed) = last_failure.as_ref().filter(|f| f.rejected.as_deref() == Some(rejected)) {
                debug!(error = %failed.error, "refresh for this token already failed");
                return Err(failed.error.clone());
            }
        }

        let held = self.credentials.access_token();
        let result = self.refresh_now(on_failure).await;
        *last_failure = match &result {
            Ok(_) => None,
            Err(error) => Some(FailedRefresh { rejected: held, error: error.clone() }),
        };
        result
    }

    async fn refresh_now(&self, on_failure: Option<InvalidationReason>) -> Result<String, ApiError> {
        let (epoch, refresh_token) = {
            let mut cell = self.write_state();
            let refresh_token = self.credentials.refresh_token();
            if refresh_token.is_some() {
                cell.session.phase = SessionPhase::Refreshing;
            }
            (cell.epoch, refresh_token)
        };
        let Some(refresh_token) = refresh_token else {
            debug!("refresh requested without a refresh token");
            if let Some(reason) = on_failure {
                self.invalidate_at(Some(epoch), reason);
            }
            return Err(ApiError::no_refresh_token());
        };

        let request = ApiRequest::post(self.paths.refresh.clone()).with_body(json!({ "refresh_token": refresh_token }));
        let result = match self.dispatch(request).await {
            Ok(response) => parse_tokens(response),
            Err(err) => Err(err),
        };

        match result {
            Ok(tokens) => {
                let refresh = match tokens.refresh_token.filter(|t| !t.is_empty()) {
                    Some(rotated) => rotated,
                    None => refresh_token,
                };
                let credentials = Credentials::new(Some(tokens.access_token.clone()), Some(refresh));
                self.commit(epoch, Some(credentials), |s| {
                    s.is_authenticated = true;
                    s.phase = SessionPhase::Authenticated;
                })?;
                info!("access token refreshed");
                self.emit(SessionEvent::Refreshed);
                Ok(tokens.access_token)
            }
            Err(err) => {
                warn!(error = %err, status = err.status, "token refresh failed; clearing session");
                match on_failure {
                    Some(reason) => self.invalidate_at(Some(epoch), reason),
                    None => {
                        self.end_session(Some(epoch), |_| {});
                    }
                }
                Err(err)
            }
        }
    }

    // -------------------------------------------------------------------------
    // check_auth / logout / invalidate
    // -------------------------------------------------------------------------

    /// Restore the session from persisted tokens at process start.
    ///
    /// Tries the stored access token, then at most one refresh followed by
    /// one more current-user fetch. Any further failure clears everything.
    /// Returns whether the session ended up authenticated.
    pub async fn check_auth(&self) -> bool {
        let (epoch, token) = {
            let mut cell = self.write_state();
            cell.session.is_loading = true;
            (cell.epoch, self.credentials.restore().access_token)
        };
        let Some(token) = token else {
            debug!("no persisted access token");
            if let Err(err) = self.commit(epoch, None, |s| *s = Session::default()) {
                debug!(error = %err, "session changed during check_auth");
            }
            return false;
        };

        let user = match self.current_user().await {
            Ok(user) => Ok(user),
            Err(err) => {
                debug!(error = %err, "stored token rejected; trying one refresh");
                match self.exchange(Some(&token), None).await {
                    Ok(_) => self.current_user().await,
                    Err(err) => Err(err),
                }
            }
        };
        let restored = user.and_then(|user| {
            self.commit(epoch, None, |s| {
                s.user = Some(user);
                s.is_authenticated = true;
                s.is_loading = false;
                s.last_error = None;
                s.phase = SessionPhase::Authenticated;
            })
        });

        match restored {
            Ok(()) => {
                info!("session restored");
                true
            }
            Err(err) => {
                warn!(error = %err, "session could not be restored");
                self.end_session(Some(epoch), |_| {});
                false
            }
        }
    }

    /// Load persisted tokens without contacting the backend. The session stays
    /// unauthenticated until `check_auth` or a refresh confirms the tokens.
    /// Returns whether an access token was found.
    pub fn restore(&self) -> bool {
        let _cell = self.write_state();
        self.credentials.restore().access_token.is_some()
    }

    /// Tell the backend (best effort), then drop all local session state.
    /// Login or refresh calls still in flight are discarded when they return.
    pub async fn logout(&self) {
        if let Err(err) = self.dispatch(ApiRequest::post(self.paths.logout.clone())).await {
            warn!(error = %err, status = err.status, "logout request failed; clearing local session anyway");
        }
        self.end_session(None, |_| {});
        info!("logged out");
        self.emit(SessionEvent::LoggedOut);
    }

    /// Drop all session state and tell subscribers to send the user to login.
    pub fn invalidate(&self, reason: InvalidationReason) {
        self.invalidate_at(None, reason);
    }

    // -------------------------------------------------------------------------
    // internals
    // -------------------------------------------------------------------------

    async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        request.attach_token(self.credentials.access_token().as_deref());
        dispatch(self.transport.as_ref(), &request).await.map_err(|f| normalize(&f))
    }

    /// Apply `f` (and store `credentials`) only if the session has not been
    /// cleared since `epoch`.
    fn commit(
        &self,
        epoch: u64,
        credentials: Option<Credentials>,
        f: impl FnOnce(&mut Session),
    ) -> Result<(), ApiError> {
        let mut cell = self.write_state();
        if cell.epoch != epoch {
            debug!(started = epoch, current = cell.epoch, "session cleared meanwhile; discarding result");
            return Err(ApiError::session_ended());
        }
        if let Some(credentials) = credentials {
            self.credentials.replace(credentials);
        }
        f(&mut cell.session);
        Ok(())
    }

    /// Clear credentials and reset the session, then apply `f`. With
    /// `Some(epoch)` nothing happens if another clear already ran since.
    /// Returns whether this call did the clearing.
    fn end_session(&self, epoch: Option<u64>, f: impl FnOnce(&mut Session)) -> bool {
        let mut cell = self.write_state();
        if epoch.is_some_and(|e| e != cell.epoch) {
            return false;
        }
        self.credentials.clear();
        cell.epoch += 1;
        cell.session = Session::default();
        f(&mut cell.session);
        true
    }

    fn invalidate_at(&self, epoch: Option<u64>, reason: InvalidationReason) {
        if self.end_session(epoch, |_| {}) {
            warn!(?reason, "session invalidated");
            self.emit(SessionEvent::Invalidated { reason });
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionCell> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionCell> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("no session event subscribers");
        }
    }
}

fn parse_tokens(response: ApiResponse) -> Result<TokenResponse, ApiError> {
    let tokens: TokenResponse = response.into_json()?;
    if tokens.access_token.is_empty() {
        return Err(normalize(&RawFailure::Request {
            description: Some("malformed response: empty access token".to_owned()),
        }));
    }
    Ok(tokens)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
