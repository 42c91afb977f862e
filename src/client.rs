//! `AdminClient`: one explicitly constructed client per process.
//!
//! Owns the transport, the session controller and the pipeline, and hands out
//! references to whatever issues requests. Nothing here is global.

use std::future::Future;
use std::sync::Arc;

use crate::config::{ClientConfig, ConfigError};
use crate::credentials::TokenStore;
use crate::loading::with_min_duration;
use crate::pipeline::RequestPipeline;
use crate::resource::{Resource, ResourceStore};
use crate::session::SessionController;
use crate::transport::{HttpTransport, Transport};

#[derive(Clone)]
pub struct AdminClient {
    config: Arc<ClientConfig>,
    session: Arc<SessionController>,
    pipeline: Arc<RequestPipeline>,
}

impl AdminClient {
    /// Build a client that talks HTTP to `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: ClientConfig, token_store: Arc<dyn TokenStore>) -> Result<Self, ConfigError> {
        let transport = Arc::new(HttpTransport::from_config(&config)?);
        Ok(Self::with_transport(config, transport, token_store))
    }

    #[must_use]
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        let session = Arc::new(SessionController::new(
            transport.clone(),
            token_store,
            config.auth_paths.clone(),
            config.refresh_mode,
        ));
        let pipeline = Arc::new(RequestPipeline::new(transport, session.clone()));
        Self { config: Arc::new(config), session, pipeline }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    /// A resource under the API prefix, e.g. `resource("users")`.
    #[must_use]
    pub fn resource(&self, path: &str) -> Resource {
        Resource::new(self.pipeline.clone(), self.config.resource_path(path))
    }

    /// A resource store using the configured minimum loading duration.
    #[must_use]
    pub fn resource_store(&self, path: &str) -> ResourceStore {
        ResourceStore::new(self.resource(path), self.config.min_loading)
    }

    /// Await `fut` under the configured minimum loading duration.
    pub async fn with_loading<F: Future>(&self, fut: F) -> F::Output {
        with_min_duration(self.config.min_loading, fut).await
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
