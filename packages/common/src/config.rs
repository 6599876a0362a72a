use serde::Deserialize;

/// Which object storage implementation backs uploads and rehosted renders.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local directory, served by whatever sits behind `public_url`.
    #[default]
    Filesystem,
    /// S3-compatible bucket (Cloudflare R2, MinIO, AWS).
    S3,
}

/// App-level object storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageAppConfig {
    /// Default: filesystem.
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the filesystem backend. Default: "./data/objects".
    #[serde(default = "default_root")]
    pub root: String,
    /// S3 endpoint URL, e.g. `https://<account>.r2.cloudflarestorage.com`.
    #[serde(default)]
    pub endpoint: String,
    /// S3 region. R2 accepts "auto". Default: "auto".
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Base URL that public object URLs are built from. Default: "http://localhost:3000/files".
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Maximum accepted object size in bytes. Default: 32 MiB.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

fn default_root() -> String {
    "./data/objects".into()
}
fn default_region() -> String {
    "auto".into()
}
fn default_public_url() -> String {
    "http://localhost:3000/files".into()
}
fn default_max_upload_size() -> u64 {
    32 * 1024 * 1024
}

impl Default for StorageAppConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: default_root(),
            endpoint: String::new(),
            region: default_region(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            public_url: default_public_url(),
            max_upload_size: default_max_upload_size(),
        }
    }
}
