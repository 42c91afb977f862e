//! admin-client: authenticated request pipeline for the admin dashboard API.
//!
//! ARCHITECTURE
//! ============
//! Leaf-first:
//! - `credentials`: access/refresh token pair with write-through persistence.
//! - `error`: `ApiError` taxonomy and the pure failure normalizer.
//! - `transport`: request/response values, the `Transport` seam, reqwest adapter.
//! - `session`: login, refresh, `check_auth`, logout; sole credential writer.
//! - `pipeline`: attach token, send, refresh once on 401, replay once.
//! - `resource`, `loading`, `client`: conveniences for screens and embedders.
//!
//! Business entities (users, roles, modules) are opaque `serde_json::Value`s.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod loading;
pub mod pipeline;
pub mod resource;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::AdminClient;
pub use config::{AuthPaths, ClientConfig, ConfigError, RefreshMode, Timeouts};
pub use credentials::{CredentialStore, Credentials, FileTokenStore, MemoryTokenStore, StoreError, TokenStore};
pub use error::{ApiError, ErrorKind, FieldError, RawFailure, normalize};
pub use loading::{LoadingState, with_min_duration};
pub use pipeline::RequestPipeline;
pub use resource::{Resource, ResourceStore};
pub use session::{InvalidationReason, Session, SessionController, SessionEvent, SessionPhase};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
