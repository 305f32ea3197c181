//! Persistence for key material and registration records.
//!
//! The pipeline reads and writes opaque byte blobs under well-known keys.
//! [`FileStore`] keeps one file per key in a directory; [`MemoryStore`] is
//! used in tests and by callers that manage persistence themselves.
//!
//! On unix the store directory is created 0700 and every file is 0600.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::error::AuthError;

/// Well-known store keys.
pub mod keys {
    /// PKCS#8 private key PEM.
    pub const PRIVATE_KEY: &str = "private_key.pem";
    /// SPKI public key PEM.
    pub const PUBLIC_KEY: &str = "public_key.pem";
    /// Published JWKS document.
    pub const JWKS: &str = "jwks.json";
    /// Raw registration response.
    pub const REGISTRATION: &str = "registration.json";
}

/// Byte-blob storage keyed by name.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` if the key is absent.
    async fn load(&self, key: &str) -> AuthResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: &[u8]) -> AuthResult<()>;

    /// Returns `true` if the key is present.
    async fn exists(&self, key: &str) -> AuthResult<bool> {
        Ok(self.load(key).await?.is_some())
    }
}

/// Loads a value that must be present.
///
/// # Errors
/// Returns a `Storage` error naming the key if it is absent.
pub async fn load_required<S>(store: &S, key: &str) -> AuthResult<Vec<u8>>
where
    S: KeyValueStore + ?Sized,
{
    store
        .load(key)
        .await?
        .ok_or_else(|| AuthError::storage(format!("{key} not found")))
}

/// Directory-backed store, one file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path for `key`.
    ///
    /// # Errors
    /// Returns a `Storage` error if the key could escape the directory.
    pub fn path_for(&self, key: &str) -> AuthResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(AuthError::storage(format!("Invalid store key: {key:?}")));
        }
        Ok(self.dir.join(key))
    }

    /// Creates the root directory, owner-only on unix.
    async fn ensure_dir(&self) -> AuthResult<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&self.dir).await.map_err(|e| {
            AuthError::storage(format!("Failed to create {}: {e}", self.dir.display()))
        })
    }
}

/// Writes `value` with mode 0600. Any entry may be secret: the registration
/// record can carry a `client_secret`.
#[cfg(unix)]
async fn write_private(path: &Path, value: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    // `mode` only applies on creation; tighten files written by older versions.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .await?;
    file.write_all(value).await?;
    file.flush().await
}

#[cfg(not(unix))]
async fn write_private(path: &Path, value: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(path, value).await
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn load(&self, key: &str) -> AuthResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::storage(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn save(&self, key: &str, value: &[u8]) -> AuthResult<()> {
        let path = self.path_for(key)?;
        self.ensure_dir().await?;
        write_private(&path, value).await.map_err(|e| {
            AuthError::storage(format!("Failed to write {}: {e}", path.display()))
        })?;

        tracing::debug!(path = %path.display(), bytes = value.len(), "Saved");
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> AuthResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &[u8]) -> AuthResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
