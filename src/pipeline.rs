//! Request pipeline: attach token, send, recover from one 401.
//!
//! ARCHITECTURE
//! ============
//! `send` runs each request through a strictly ordered sequence:
//! attach the held access token, transmit, and on a 401 ask the session
//! controller to refresh, re-attach the new token to the captured request and
//! transmit it exactly once more. Every failure leaving `send` has been
//! through `normalize`.
//!
//! A refresh that fails is fatal to the session: by the time
//! `refresh_for_retry` returns, the controller has cleared credentials and
//! subscribers have been told to route the user to login. Concurrent callers
//! that joined the failed exchange all get its error.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ApiError, RawFailure, normalize};
use crate::session::SessionController;
use crate::transport::{ApiRequest, ApiResponse, Transport};

pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    session: Arc<SessionController>,
}

impl RequestPipeline {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionController>) -> Self {
        Self { transport, session }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    /// Send a request with token attachment and single refresh-and-retry.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure of the call, of its single retry, or of
    /// the refresh (classified as an authentication error).
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let observed = self.session.access_token();
        request.attach_token(observed.as_deref());

        let failure = match dispatch(self.transport.as_ref(), &request).await {
            Ok(response) => return Ok(response),
            Err(failure) => failure,
        };
        if !failure.is_unauthorized() || request.retried() {
            return Err(normalize(&failure));
        }

        request.mark_retried();
        debug!(request_id = %request.id, path = %request.path, "401 received; refreshing before retry");
        let token = match self.session.refresh_for_retry(observed.as_deref()).await {
            Ok(token) => token,
            Err(err) => {
                warn!(request_id = %request.id, error = %err, "refresh failed; request not replayed");
                return Err(err.into_authentication());
            }
        };

        request.attach_token(Some(&token));
        dispatch(self.transport.as_ref(), &request).await.map_err(|f| normalize(&f))
    }

    /// Send and deserialize the response body.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure, or a malformed-response error if the
    /// body does not deserialize into `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.send(request).await?.into_json()
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::send_json`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::send`].
    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        Ok(self.send(ApiRequest::get(path)).await?.body)
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::send`].
    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        Ok(self.send(ApiRequest::post(path).with_body(body)).await?.body)
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::send`].
    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        Ok(self.send(ApiRequest::put(path).with_body(body)).await?.body)
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::send`].
    pub async fn patch(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        Ok(self.send(ApiRequest::patch(path).with_body(body)).await?.body)
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::send`].
    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        Ok(self.send(ApiRequest::delete(path)).await?.body)
    }
}

/// Transmit one request as-is and trace the outcome. No normalization, no retry.
pub(crate) async fn dispatch(transport: &dyn Transport, request: &ApiRequest) -> Result<ApiResponse, RawFailure> {
    debug!(
        request_id = %request.id,
        method = %request.method,
        path = %request.path,
        authenticated = request.bearer().is_some(),
        retried = request.retried(),
        "sending request"
    );
    let result = transport.execute(request).await;
    match &result {
        Ok(response) => debug!(request_id = %request.id, status = response.status, "response received"),
        Err(failure) => debug!(request_id = %request.id, status = ?failure.status(), "request failed"),
    }
    result
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
