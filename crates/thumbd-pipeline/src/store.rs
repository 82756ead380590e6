//! Artifact store abstraction over object storage.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thumbd_storage::{R2Client, StorageError, StorageResult};

/// Object-store operations the pipeline needs. Get/put are assumed
/// atomic-enough and consistent per key.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch an object, `None` if the key does not exist.
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Store an object under a key.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Whether an object exists under a key.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Lightweight connectivity check, used by readiness probes.
    async fn check(&self) -> StorageResult<()>;
}

#[async_trait]
impl ArtifactStore for R2Client {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        match self.get_bytes(key).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        self.put_bytes(key, data, content_type).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        R2Client::exists(self, key).await
    }

    async fn check(&self) -> StorageResult<()> {
        self.check_connectivity().await
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, bypassing the pipeline.
    pub fn insert(&self, key: &str, data: Vec<u8>, content_type: &str) {
        self.objects
            .lock()
            .expect("store poisoned")
            .insert(key.to_string(), (data, content_type.to_string()));
    }

    /// Content type recorded for a key, if present.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .expect("store poisoned")
            .get(key)
            .map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .objects
            .lock()
            .expect("store poisoned")
            .get(key)
            .map(|(data, _)| data.clone()))
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        self.insert(key, data, content_type);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self
            .objects
            .lock()
            .expect("store poisoned")
            .contains_key(key))
    }

    async fn check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Store wrapper that fails every put, for persistence-failure tests.
#[doc(hidden)]
pub struct FailingPutStore(pub MemoryStore);

#[async_trait]
impl ArtifactStore for FailingPutStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.0.get(key).await
    }

    async fn put(&self, _key: &str, _data: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        Err(StorageError::upload_failed("simulated outage"))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.0.exists(key).await
    }

    async fn check(&self) -> StorageResult<()> {
        self.0.check().await
    }
}
