//! Bearer token handling.
//!
//! The current identity is a `watch` channel so the connection controller can
//! react to login and logout without polling.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::debug;

use crate::error::Result;

/// Shared handle to the authenticated user's bearer token.
#[derive(Debug, Clone)]
pub struct AuthHandle {
    tx: watch::Sender<Option<String>>,
}

impl AuthHandle {
    /// A handle with no authenticated user.
    pub fn anonymous() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let handle = Self::anonymous();
        handle.login(token);
        handle
    }

    pub fn login(&self, token: impl Into<String>) {
        let token = token.into();
        self.tx.send_replace(Some(token));
        debug!("Auth token updated");
    }

    pub fn logout(&self) {
        self.tx.send_replace(None);
        debug!("Auth token cleared");
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for AuthHandle {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// A token persisted on disk by a previous login.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the token. A missing or blank file means no identity.
    pub async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn store(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, token).await?;
        Ok(())
    }
}
