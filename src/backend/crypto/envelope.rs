// src/backend/crypto/envelope.rs
//! Per-secret envelope encryption.
//!
//! Each secret has its own 256-bit envelope key. Fields are sealed with
//! AES-256-GCM-SIV under that key; the key itself is wrapped with AES-256-GCM
//! under a holder's root key (a user's or a policy's). Every blob is
//! `nonce (12 bytes) || ciphertext || tag`.

use crate::error::VaultError;
use crate::models::common::{EncryptedBlob, SecretFields};
use aes_gcm::Aes256Gcm;
use aes_gcm_siv::aead::{Aead, KeyInit};
use aes_gcm_siv::Aes256GcmSiv;
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// 12-byte nonce, stored in front of every ciphertext.
pub const NONCE_SIZE: usize = 12;

const TAG_SIZE: usize = 16;

/// Length of a wrapped envelope key blob.
pub const WRAPPED_KEY_SIZE: usize = NONCE_SIZE + KEY_SIZE + TAG_SIZE;

/// Holder-scoped key from the derivation service (zeroized on drop).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RootKey {
    bytes: [u8; KEY_SIZE],
}

impl RootKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RootKey(..)")
    }
}

/// Per-secret symmetric key; only ever held unwrapped for one call.
#[derive(Zeroize, ZeroizeOnDrop)]
struct EnvelopeKey {
    bytes: [u8; KEY_SIZE],
}

impl EnvelopeKey {
    fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    fn cipher(&self) -> Result<Aes256GcmSiv, VaultError> {
        Aes256GcmSiv::new_from_slice(&self.bytes)
            .map_err(|_| VaultError::InternalError("invalid envelope key length".to_string()))
    }
}

fn random_nonce<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);
    nonce
}

fn join(nonce: &[u8; NONCE_SIZE], ciphertext: Vec<u8>) -> EncryptedBlob {
    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(nonce);
    blob.extend_from_slice(&ciphertext);
    EncryptedBlob(blob)
}

fn split(blob: &EncryptedBlob) -> Result<(&[u8], &[u8]), VaultError> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(VaultError::DecryptionFailed);
    }
    Ok(blob.as_slice().split_at(NONCE_SIZE))
}

/// Reads the nonce a stored blob was sealed with.
pub fn extract_nonce(blob: &EncryptedBlob) -> Result<[u8; NONCE_SIZE], VaultError> {
    let (nonce, _) = split(blob)?;
    nonce.try_into().map_err(|_| VaultError::DecryptionFailed)
}

fn seal_field(
    cipher: &Aes256GcmSiv,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &str,
) -> Result<EncryptedBlob, VaultError> {
    let ciphertext = cipher
        .encrypt(aes_gcm_siv::Nonce::from_slice(nonce), plaintext.as_bytes())
        .map_err(|_| VaultError::InternalError("field encryption failed".to_string()))?;
    Ok(join(nonce, ciphertext))
}

fn open_field(cipher: &Aes256GcmSiv, blob: &EncryptedBlob) -> Result<String, VaultError> {
    let (nonce, ciphertext) = split(blob)?;
    let plaintext = cipher
        .decrypt(aes_gcm_siv::Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::DecryptionFailed)?;
    String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed)
}

fn wrap_key<R: RngCore + CryptoRng>(
    key: &EnvelopeKey,
    root_key: &RootKey,
    rng: &mut R,
) -> Result<EncryptedBlob, VaultError> {
    let cipher = Aes256Gcm::new_from_slice(root_key.as_bytes())
        .map_err(|_| VaultError::InternalError("invalid root key length".to_string()))?;
    let nonce = random_nonce(rng);
    let wrapped = cipher
        .encrypt(aes_gcm::Nonce::from_slice(&nonce), key.bytes.as_slice())
        .map_err(|_| VaultError::InternalError("key wrapping failed".to_string()))?;
    Ok(join(&nonce, wrapped))
}

fn unwrap_key(wrapped_key: &EncryptedBlob, root_key: &RootKey) -> Result<EnvelopeKey, VaultError> {
    let (nonce, ciphertext) = split(wrapped_key)?;
    let cipher = Aes256Gcm::new_from_slice(root_key.as_bytes())
        .map_err(|_| VaultError::InternalError("invalid root key length".to_string()))?;
    let bytes = Zeroizing::new(
        cipher
            .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::DecryptionFailed)?,
    );
    let bytes: [u8; KEY_SIZE] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| VaultError::DecryptionFailed)?;
    Ok(EnvelopeKey { bytes })
}

/// Encrypts a brand-new secret: fresh envelope key, fresh nonce per field,
/// and the envelope key wrapped under `root_key`.
pub fn encrypt_new<R: RngCore + CryptoRng>(
    plaintext: &SecretFields<String>,
    root_key: &RootKey,
    rng: &mut R,
) -> Result<(SecretFields<EncryptedBlob>, EncryptedBlob), VaultError> {
    let key = EnvelopeKey::generate(rng);
    let cipher = key.cipher()?;
    let ciphertexts = plaintext.try_map(|value| {
        let nonce = random_nonce(rng);
        seal_field(&cipher, &nonce, value)
    })?;
    let wrapped_key = wrap_key(&key, root_key, rng)?;
    Ok((ciphertexts, wrapped_key))
}

/// Re-encrypts an existing secret under its unchanged envelope key.
///
/// Fields that were already stored keep the nonce of their stored blob; fields
/// that are new get a fresh nonce. Fields absent from `plaintext` are dropped.
/// The wrapped key is untouched, so every key box entry keeps working.
pub fn encrypt_update<R: RngCore + CryptoRng>(
    plaintext: &SecretFields<String>,
    root_key: &RootKey,
    wrapped_key: &EncryptedBlob,
    existing: &SecretFields<EncryptedBlob>,
    rng: &mut R,
) -> Result<SecretFields<EncryptedBlob>, VaultError> {
    let key = unwrap_key(wrapped_key, root_key)?;
    let cipher = key.cipher()?;
    plaintext.try_map_with(existing, |value, stored| {
        let nonce = match stored {
            Some(blob) => extract_nonce(blob)?,
            None => random_nonce(rng),
        };
        seal_field(&cipher, &nonce, value)
    })
}

/// Unwraps the envelope key with `root_key` and opens every field.
pub fn decrypt(
    ciphertexts: &SecretFields<EncryptedBlob>,
    wrapped_key: &EncryptedBlob,
    root_key: &RootKey,
) -> Result<SecretFields<String>, VaultError> {
    let key = unwrap_key(wrapped_key, root_key)?;
    let cipher = key.cipher()?;
    ciphertexts.try_map(|blob| open_field(&cipher, blob))
}

/// Moves a wrapped envelope key from holder A to holder B.
pub fn rewrap<R: RngCore + CryptoRng>(
    wrapped_key: &EncryptedBlob,
    root_key_a: &RootKey,
    root_key_b: &RootKey,
    rng: &mut R,
) -> Result<EncryptedBlob, VaultError> {
    let key = unwrap_key(wrapped_key, root_key_a)?;
    wrap_key(&key, root_key_b, rng)
}
