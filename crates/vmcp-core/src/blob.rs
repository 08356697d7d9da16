//! Blob storage interface for custom resources backed by uploaded files
//! (spec §6 blob store contract: `put/get/delete/rename/list`).

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob {0} not found")]
    NotFound(String),
    #[error("blob store error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub struct BlobMeta {
    pub blob_id: String,
    pub filename: String,
    pub mime: String,
    pub len: usize,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, filename: &str, mime: &str, bytes: Vec<u8>) -> Result<BlobMeta, BlobError>;
    async fn get(&self, blob_id: &str) -> Result<(BlobMeta, Vec<u8>), BlobError>;
    async fn delete(&self, blob_id: &str) -> Result<(), BlobError>;
    async fn rename(&self, blob_id: &str, filename: &str) -> Result<(), BlobError>;
    async fn list(&self) -> Result<Vec<BlobMeta>, BlobError>;
}

/// In-memory implementation for tests (SPEC_FULL §2).
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: dashmap::DashMap<String, (BlobMeta, Vec<u8>)>,
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, filename: &str, mime: &str, bytes: Vec<u8>) -> Result<BlobMeta, BlobError> {
        let blob_id = uuid::Uuid::new_v4().to_string();
        let meta = BlobMeta {
            blob_id: blob_id.clone(),
            filename: filename.to_string(),
            mime: mime.to_string(),
            len: bytes.len(),
        };
        self.blobs.insert(blob_id, (meta.clone(), bytes));
        Ok(meta)
    }

    async fn get(&self, blob_id: &str) -> Result<(BlobMeta, Vec<u8>), BlobError> {
        self.blobs
            .get(blob_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BlobError::NotFound(blob_id.to_string()))
    }

    async fn delete(&self, blob_id: &str) -> Result<(), BlobError> {
        self.blobs
            .remove(blob_id)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(blob_id.to_string()))
    }

    async fn rename(&self, blob_id: &str, filename: &str) -> Result<(), BlobError> {
        let mut entry = self
            .blobs
            .get_mut(blob_id)
            .ok_or_else(|| BlobError::NotFound(blob_id.to_string()))?;
        entry.value_mut().0.filename = filename.to_string();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobMeta>, BlobError> {
        Ok(self.blobs.iter().map(|e| e.value().0.clone()).collect())
    }
}
