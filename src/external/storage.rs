use crate::errors::ServiceError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Object storage accepting a buffer and a path, returning a public URL.
///
/// The workflow uses the path convention
/// `{folder}/{uploader_id}/{po_number}/{attachment_id}`.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, ServiceError>;
}

/// In-memory storage for tests: keeps uploads and mints deterministic URLs.
#[derive(Default)]
pub struct InMemoryObjectStorage {
    uploads: Arc<RwLock<Vec<(String, usize)>>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths and payload sizes uploaded so far.
    pub async fn uploads(&self) -> Vec<(String, usize)> {
        self.uploads.read().await.clone()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, ServiceError> {
        self.uploads
            .write()
            .await
            .push((path.to_string(), bytes.len()));
        Ok(format!("https://storage.local/{path}"))
    }
}
