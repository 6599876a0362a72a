use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

use super::error::StorageError;
use super::key::validate_key;
use super::traits::ObjectStore;
use crate::config::StorageAppConfig;

/// S3-compatible object store (Cloudflare R2, MinIO, AWS S3).
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    public_url: String,
    max_size: u64,
}

impl S3ObjectStore {
    pub fn from_config(config: &StorageAppConfig) -> Result<Self, StorageError> {
        if config.endpoint.is_empty() || config.bucket.is_empty() {
            return Err(StorageError::Backend(
                "S3 storage requires endpoint and bucket".into(),
            ));
        }

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("invalid credentials: {e}")))?;

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(backend_error)?
            .with_path_style();

        // R2 has no public endpoint by default; fall back to the path-style URL.
        let public_url = if config.public_url.is_empty() {
            format!("{}/{}", config.endpoint.trim_end_matches('/'), config.bucket)
        } else {
            config.public_url.clone()
        };

        Ok(Self {
            bucket,
            public_url,
            max_size: config.max_upload_size,
        })
    }
}

fn backend_error(err: S3Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn is_not_found(err: &S3Error) -> bool {
    matches!(err, S3Error::HttpFailWithBody(404, _))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let key = validate_key(key)?;
        if data.len() as u64 > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: data.len() as u64,
                limit: self.max_size,
            });
        }

        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(backend_error)?;

        match response.status_code() {
            200..=299 => {
                tracing::debug!(key, size = data.len(), "Stored object");
                Ok(())
            }
            status => Err(StorageError::Backend(format!(
                "put {key} returned HTTP {status}"
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let key = validate_key(key)?;
        match self.bucket.head_object(key).await {
            Ok((_, 404)) => return Ok(false),
            Ok(_) => {}
            Err(e) if is_not_found(&e) => return Ok(false),
            Err(e) => return Err(backend_error(e)),
        }
        self.bucket.delete_object(key).await.map_err(backend_error)?;
        Ok(true)
    }

    fn public_base(&self) -> &str {
        &self.public_url
    }
}
