use std::path::PathBuf;
use std::sync::Arc;

use common::config::{StorageAppConfig, StorageBackend};
use common::storage::filesystem::FilesystemObjectStore;
use common::storage::s3::S3ObjectStore;
use common::storage::{ObjectStore, StorageError};

/// Build the configured object store.
pub async fn build_store(config: &StorageAppConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let store: Arc<dyn ObjectStore> = match config.backend {
        StorageBackend::Filesystem => {
            tracing::info!(root = %config.root, "Using filesystem object storage");
            Arc::new(
                FilesystemObjectStore::new(
                    PathBuf::from(&config.root),
                    config.public_url.clone(),
                    config.max_upload_size,
                )
                .await?,
            )
        }
        StorageBackend::S3 => {
            tracing::info!(bucket = %config.bucket, endpoint = %config.endpoint, "Using S3 object storage");
            Arc::new(S3ObjectStore::from_config(config)?)
        }
    };
    Ok(store)
}
