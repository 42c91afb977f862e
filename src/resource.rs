//! Payload-agnostic REST resources on top of the pipeline.
//!
//! `Resource` maps the usual collection/item verbs onto one base path.
//! `ResourceStore` is the caller side of the error policy: it keeps the last
//! failure's message for display and still returns the error so the caller
//! can react (a redirect, a toast).

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;

use crate::error::ApiError;
use crate::loading::LoadingState;
use crate::pipeline::RequestPipeline;
use crate::transport::ApiRequest;

#[derive(Clone)]
pub struct Resource {
    pipeline: Arc<RequestPipeline>,
    path: String,
}

impl Resource {
    /// `path` is the collection path, e.g. `/api/v1/users`.
    #[must_use]
    pub fn new(pipeline: Arc<RequestPipeline>, path: impl Into<String>) -> Self {
        let path: String = path.into();
        Self { pipeline, path: path.trim_end_matches('/').to_owned() }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.path, id.trim_matches('/'))
    }

    /// # Errors
    ///
    /// Returns the normalized failure from the pipeline.
    pub async fn list(&self, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        let request = query
            .iter()
            .fold(ApiRequest::get(self.path.clone()), |req, (k, v)| req.with_query(*k, *v));
        Ok(self.pipeline.send(request).await?.body)
    }

    /// # Errors
    ///
    /// Returns the normalized failure from the pipeline.
    pub async fn get(&self, id: &str) -> Result<Value, ApiError> {
        self.pipeline.get(&self.item_path(id)).await
    }

    /// # Errors
    ///
    /// Returns the normalized failure from the pipeline.
    pub async fn create(&self, body: Value) -> Result<Value, ApiError> {
        self.pipeline.post(&self.path, body).await
    }

    /// Full replacement (`PUT`).
    ///
    /// # Errors
    ///
    /// Returns the normalized failure from the pipeline.
    pub async fn update(&self, id: &str, body: Value) -> Result<Value, ApiError> {
        self.pipeline.put(&self.item_path(id), body).await
    }

    /// Partial update (`PATCH`).
    ///
    /// # Errors
    ///
    /// Returns the normalized failure from the pipeline.
    pub async fn patch(&self, id: &str, body: Value) -> Result<Value, ApiError> {
        self.pipeline.patch(&self.item_path(id), body).await
    }

    /// # Errors
    ///
    /// Returns the normalized failure from the pipeline.
    pub async fn delete(&self, id: &str) -> Result<Value, ApiError> {
        self.pipeline.delete(&self.item_path(id)).await
    }
}

// =============================================================================
// RESOURCE STORE
// =============================================================================

/// Per-screen state for one resource: loading flag and last error message.
pub struct ResourceStore {
    resource: Resource,
    error: RwLock<Option<String>>,
    loading: LoadingState,
    min_loading: Duration,
}

impl ResourceStore {
    #[must_use]
    pub fn new(resource: Resource, min_loading: Duration) -> Self {
        Self { resource, error: RwLock::new(None), loading: LoadingState::new(), min_loading }
    }

    #[must_use]
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Message of the most recent failure, cleared when the next call starts.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.error.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    /// # Errors
    ///
    /// Returns the normalized failure after recording its message.
    pub async fn list(&self, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        self.track(self.resource.list(query)).await
    }

    /// # Errors
    ///
    /// Returns the normalized failure after recording its message.
    pub async fn get(&self, id: &str) -> Result<Value, ApiError> {
        self.track(self.resource.get(id)).await
    }

    /// # Errors
    ///
    /// Returns the normalized failure after recording its message.
    pub async fn create(&self, body: Value) -> Result<Value, ApiError> {
        self.track(self.resource.create(body)).await
    }

    /// # Errors
    ///
    /// Returns the normalized failure after recording its message.
    pub async fn update(&self, id: &str, body: Value) -> Result<Value, ApiError> {
        self.track(self.resource.update(id, body)).await
    }

    /// # Errors
    ///
    /// Returns the normalized failure after recording its message.
    pub async fn delete(&self, id: &str) -> Result<Value, ApiError> {
        self.track(self.resource.delete(id)).await
    }

    async fn track<T>(&self, fut: impl Future<Output = Result<T, ApiError>>) -> Result<T, ApiError> {
        self.set_error(None);
        let result = self.loading.track(self.min_loading, fut).await;
        if let Err(err) = &result {
            self.set_error(Some(err.message.clone()));
        }
        result
    }

    fn set_error(&self, message: Option<String>) {
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = message;
    }
}

#[cfg(test)]
#[path = "resource_test.rs"]
mod tests;
