mod error;
mod key;
mod traits;

pub mod filesystem;
#[cfg(feature = "object-storage")]
pub mod s3;

pub use error::StorageError;
pub use key::{generation_key, join_public_url, upload_key, validate_key};
pub use traits::ObjectStore;
