// src/backend/utils/crypto.rs

use crate::error::VaultError;
use crate::utils::rng::with_internal_rng;
use candid::Principal;
use rand_chacha::rand_core::RngCore;
use sha2::{Digest, Sha256};

/// Length of server-assigned principal ids (the maximum a Principal holds).
const GENERATED_ID_LEN: usize = 29;

/// Generates a fresh opaque identifier from the internal RNG.
pub fn generate_unique_principal() -> Result<Principal, VaultError> {
    with_internal_rng(|rng| {
        let mut bytes = [0u8; GENERATED_ID_LEN];
        rng.fill_bytes(&mut bytes);
        Principal::from_slice(&bytes)
    })
}

/// Calculates the SHA256 hash of byte data and returns it as a hex string.
pub fn calculate_sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Short, non-reversible tag for logging derivation contexts.
pub fn fingerprint(data: &[u8]) -> String {
    let mut full = calculate_sha256_hex(data);
    full.truncate(16);
    full
}
