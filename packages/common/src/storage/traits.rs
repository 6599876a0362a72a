use async_trait::async_trait;

use super::error::StorageError;
use super::key::join_public_url;

/// Key-addressed object storage with publicly reachable URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    /// Delete an object.
    ///
    /// Returns `true` if the object was deleted, `false` if it did not exist.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Base URL public object URLs are built from.
    fn public_base(&self) -> &str;

    /// Public URL for an object key.
    fn public_url(&self, key: &str) -> String {
        join_public_url(self.public_base(), key)
    }

    /// Store bytes and return the public URL of the stored object.
    async fn put_public(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.put(key, data, content_type).await?;
        Ok(self.public_url(key))
    }
}
