//! Access and refresh tokens.
//!
//! DESIGN
//! ======
//! `CredentialStore` holds the live token pair in memory and writes every
//! change through to an injected `TokenStore`, so a restarted process picks
//! up where the last one stopped. Readers are public; the writers are
//! crate-private because only the session controller may mutate credentials.
//!
//! A persistence failure is logged and never blocks a session transition:
//! the in-memory pair stays authoritative for the running process.

use std::fmt;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// =============================================================================
// CREDENTIALS
// =============================================================================

/// The token pair. Empty strings are never stored; they become `None`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self { access_token: non_empty(access_token), refresh_token: non_empty(refresh_token) }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    fn normalized(self) -> Self {
        Self::new(self.access_token, self.refresh_token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("token store io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("token store contents invalid: {0}")]
    Format(#[from] serde_json::Error),
}

/// Durable home for the token pair.
pub trait TokenStore: Send + Sync {
    /// Read the persisted pair. A store with nothing saved returns an empty pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read or decoded.
    fn load(&self) -> Result<Credentials, StoreError>;

    /// Overwrite the persisted pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, credentials: &Credentials) -> Result<(), StoreError>;

    /// Delete the persisted pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be removed.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Credentials>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self { inner: Mutex::new(credentials.normalized()) }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Credentials, StoreError> {
        Ok(self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = credentials.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Credentials::default();
        Ok(())
    }
}

/// JSON file holding `{"access_token": ..., "refresh_token": ...}`.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Credentials, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Credentials::default()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Credentials::default());
        }
        let credentials: Credentials = serde_json::from_str(&text)?;
        Ok(credentials.normalized())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(credentials)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// CREDENTIAL STORE
// =============================================================================

/// Live token pair plus its write-through persistence.
pub struct CredentialStore {
    current: RwLock<Credentials>,
    backend: Arc<dyn TokenStore>,
}

impl CredentialStore {
    /// Start empty; call `restore` to pick up persisted tokens.
    #[must_use]
    pub fn new(backend: Arc<dyn TokenStore>) -> Self {
        Self { current: RwLock::new(Credentials::default()), backend }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> Credentials {
        self.read().clone()
    }

    /// Replace the in-memory pair with whatever the backend holds.
    pub(crate) fn restore(&self) -> Credentials {
        let loaded = match self.backend.load() {
            Ok(credentials) => credentials.normalized(),
            Err(e) => {
                warn!(error = %e, "token store read failed; starting without credentials");
                Credentials::default()
            }
        };
        *self.write() = loaded.clone();
        debug!(has_access = loaded.access_token.is_some(), "credentials restored");
        loaded
    }

    pub(crate) fn replace(&self, credentials: Credentials) {
        let credentials = credentials.normalized();
        if let Err(e) = self.backend.save(&credentials) {
            warn!(error = %e, "token store write failed");
        }
        *self.write() = credentials;
    }

    pub(crate) fn clear(&self) {
        if let Err(e) = self.backend.clear() {
            warn!(error = %e, "token store clear failed");
        }
        *self.write() = Credentials::default();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Credentials> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Credentials> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;
