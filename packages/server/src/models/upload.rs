use serde::Serialize;

/// Multipart form accepted by the upload endpoint (documentation only).
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// The file to store. Its filename must be flat (no directories).
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    /// Public URL, prefixed with the configured storage base.
    #[schema(example = "https://cdn.example.com/uploads/1f0c...-plan.png")]
    pub url: String,
    #[schema(example = "uploads/1f0c...-plan.png")]
    pub key: String,
    #[schema(example = "image/png")]
    pub content_type: String,
    #[schema(example = 48213)]
    pub size: u64,
}
