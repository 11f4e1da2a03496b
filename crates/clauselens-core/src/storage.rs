//! Object storage and time-limited signed URLs
//!
//! Uploaded files live behind the [`ObjectStore`] trait; the default
//! backend writes to a local data directory. Download access goes through
//! [`UrlSigner`]: a URL carries an expiry and a SHA-256 signature over
//! `secret ‖ path ‖ expires`, so the file route can verify access without
//! any session state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;

/// Default signed-URL lifetime: one hour.
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(3600);

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under the given storage path (upsert).
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read the object back.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Remove the object. Deleting a missing object is a no-op.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Filesystem-backed object store rooted at a data directory
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        // Storage paths are server-generated, but the file route accepts
        // client-supplied ones; refuse traversal outright.
        if path.split('/').any(|seg| seg == "..") || path.starts_with('/') {
            anyhow::bail!("invalid storage path: {path}");
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("writing {}", full.display()))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("reading {}", full.display()))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting {}", full.display())),
        }
    }
}

// ── Signed URLs ───────────────────────────────────────────────────────────

/// A minted time-limited access URL
#[derive(Debug, Clone, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints and verifies signed file URLs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn signature(&self, path: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(path.as_bytes());
        hasher.update(expires.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Mint a URL for `path` valid for `ttl` from now.
    pub fn sign(&self, path: &str, ttl: Duration) -> SignedUrl {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1));
        let expires = expires_at.timestamp();
        let sig = self.signature(path, expires);
        SignedUrl {
            url: format!("/files/{}?expires={}&sig={}", path, expires, sig),
            expires_at,
        }
    }

    /// Check signature and expiry for a presented URL's components.
    pub fn verify(&self, path: &str, expires: i64, sig: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        self.signature(path, expires) == sig
    }
}
