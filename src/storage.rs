use async_trait::async_trait;
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage rejected the operation: {0}")]
    Rejected(String),
}

// 1. StorageService Contract
/// StorageService
///
/// The contract for the file store behind uploaded images and avatars. Paths are
/// relative (`images/<hash>.png`) and are the same strings persisted in the database.
/// Handlers never touch the filesystem directly, so tests swap in
/// `MockStorageService`.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the `images/` and `avatars/` layout. Safe to call at every startup.
    async fn ensure_layout(&self) -> Result<(), StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Writes (or overwrites) the object at `path`.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Removes the object at `path`. Removing a missing object is not an error.
    async fn remove(&self, path: &str) -> Result<(), StorageError>;
}

/// sanitize_key
///
/// Strips directory navigation components (`..`, `.`, empty segments) so a stored
/// path can never escape the storage root.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 2. The Real Implementation (local disk under the static root)
/// LocalDiskStorage
///
/// Stores objects as plain files below `root`, which is also mounted as the static
/// file directory so `<scheme>://<host>/<path>` resolves to the stored bytes.
#[derive(Clone)]
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let key = sanitize_key(path);
        if key.is_empty() {
            return Err(StorageError::Rejected(format!("empty storage key for {path:?}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageService for LocalDiskStorage {
    async fn ensure_layout(&self) -> Result<(), StorageError> {
        for dir in ["images", "avatars"] {
            tokio::fs::create_dir_all(self.root.join(dir)).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.resolve(path)?).await?)
    }

    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(target, bytes).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.resolve(path)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// An in-memory store used by handler and router tests. Clones share the same
/// objects, so a test can keep a handle and inspect what the handlers wrote.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, every write and removal fails.
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().contains_key(&sanitize_key(path))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn guard(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Rejected(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_layout(&self) -> Result<(), StorageError> {
        // No-op in mock environment.
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.contains(path))
    }

    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.guard()?;
        self.lock().insert(sanitize_key(path), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.guard()?;
        self.lock().remove(&sanitize_key(path));
        Ok(())
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
