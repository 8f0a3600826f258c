// src/backend/utils/validation.rs
use crate::error::VaultError;
use crate::models::common::{EncryptedBlob, SecretFields};
use validator::Validate;

/// Upper bound on a single stored ciphertext, nonce and tag included.
pub const MAX_BLOB_BYTES: usize = 4096 + 12 + 16;

pub fn validate_request<T: Validate>(req: &T) -> Result<(), VaultError> {
    req.validate().map_err(|e| VaultError::InvalidInput(e.to_string()))
}

pub fn validate_blob(label: &str, blob: &EncryptedBlob) -> Result<(), VaultError> {
    if blob.is_empty() || blob.len() > MAX_BLOB_BYTES {
        return Err(VaultError::InvalidInput(format!(
            "{} must be between 1 and {} bytes, got {}",
            label,
            MAX_BLOB_BYTES,
            blob.len()
        )));
    }
    Ok(())
}

pub fn validate_fields(fields: &SecretFields<EncryptedBlob>) -> Result<(), VaultError> {
    fields.iter().try_for_each(|blob| validate_blob("secret field", blob))
}
