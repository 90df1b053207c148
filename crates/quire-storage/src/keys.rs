//! Shared key generation for storage backends.
//!
//! Key format: `{folder}/{filename}` with the folder trimmed of surrounding slashes.

use crate::traits::{StorageError, StorageResult};

/// Generate a storage key for the given folder hint and filename.
///
/// All backends must use this format so URLs stay consistent across them.
pub fn generate_storage_key(folder: &str, filename: &str) -> StorageResult<String> {
    let folder = folder.trim_matches('/');
    if filename.is_empty() || filename.contains('/') {
        return Err(StorageError::InvalidKey(format!(
            "Invalid filename: {:?}",
            filename
        )));
    }

    let key = if folder.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", folder, filename)
    };

    validate_key(&key)?;
    Ok(key)
}

/// Reject keys that could escape the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}
