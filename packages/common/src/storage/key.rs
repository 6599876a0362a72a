use super::error::StorageError;

const MAX_KEY_LEN: usize = 512;

/// Key for the `index`-th rendered variant of a render request.
pub fn generation_key(request_id: &str, index: usize) -> String {
    format!("generations/{request_id}-{index}.png")
}

/// Key for a user upload. The filename must already be a validated flat name.
pub fn upload_key(filename: &str) -> String {
    format!("uploads/{}-{}", uuid::Uuid::new_v4(), filename)
}

/// Join a public base URL and an object key with exactly one slash between them.
pub fn join_public_url(base: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

/// Validate an object key.
///
/// Keys are relative, slash-separated, and limited to `a-zA-Z0-9/-_.` so they
/// map safely onto both filesystem paths and S3 object names.
pub fn validate_key(key: &str) -> Result<&str, StorageError> {
    let invalid = |msg: &str| Err(StorageError::InvalidKey(msg.to_string()));

    if key.is_empty() {
        return invalid("key cannot be empty");
    }
    if key.len() > MAX_KEY_LEN {
        return invalid("key exceeds maximum length of 512 characters");
    }
    if key.starts_with('/') || key.ends_with('/') {
        return invalid("key must not start or end with '/'");
    }
    if key.contains('\\') || key.contains('\0') {
        return invalid("key must not contain backslashes or null bytes");
    }
    for segment in key.split('/') {
        if segment.is_empty() {
            return invalid("key must not contain empty segments");
        }
        if segment.starts_with('.') {
            return invalid("key segments must not start with '.'");
        }
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'))
    {
        return invalid("key contains invalid characters (allowed: a-zA-Z0-9, /, -, _, .)");
    }

    Ok(key)
}
