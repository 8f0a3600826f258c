// src/backend/models/common.rs
use candid::{CandidType, Principal};
use serde::{Deserialize, Serialize};

// Every identifier is a Principal: users are authenticated callers, the rest
// are server-assigned from the internal RNG.
pub type UserId = Principal;
pub type SecretId = Principal;
pub type PolicyId = Principal;
pub type ConditionId = Principal;
pub type PrincipalId = Principal;

pub type Timestamp = u64; // Nanoseconds since epoch

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;
pub const NANOS_PER_DAY: u64 = 24 * 60 * 60 * NANOS_PER_SECOND;

/// Role a caller holds with respect to a single policy.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Copy)]
pub enum Role {
    Owner,
    Beneficiary,
    Validator,
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Copy)]
pub enum SecretCategory {
    Password,
    Note,
    Document,
}

/// Opaque ciphertext blob. Field blobs and wrapped keys both carry their
/// 12-byte nonce as a prefix so each blob is self-describing.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct EncryptedBlob(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl EncryptedBlob {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for EncryptedBlob {
    fn from(bytes: Vec<u8>) -> Self {
        EncryptedBlob(bytes)
    }
}

/// The optional fields of a secret. Used with `String` for plaintext on the
/// client side and with [`EncryptedBlob`] for what the backend stores.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SecretFields<T> {
    pub name: Option<T>,
    pub url: Option<T>,
    pub username: Option<T>,
    pub password: Option<T>,
    pub notes: Option<T>,
}

impl<T> Default for SecretFields<T> {
    fn default() -> Self {
        Self {
            name: None,
            url: None,
            username: None,
            password: None,
            notes: None,
        }
    }
}

impl<T> SecretFields<T> {
    /// Applies `f` to every populated field, keeping absent fields absent.
    pub fn try_map<U, E, F>(&self, mut f: F) -> Result<SecretFields<U>, E>
    where
        F: FnMut(&T) -> Result<U, E>,
    {
        Ok(SecretFields {
            name: self.name.as_ref().map(&mut f).transpose()?,
            url: self.url.as_ref().map(&mut f).transpose()?,
            username: self.username.as_ref().map(&mut f).transpose()?,
            password: self.password.as_ref().map(&mut f).transpose()?,
            notes: self.notes.as_ref().map(&mut f).transpose()?,
        })
    }

    /// Like [`SecretFields::try_map`], but also hands `f` the same field of
    /// `other` when it is populated there.
    pub fn try_map_with<U, V, E, F>(&self, other: &SecretFields<U>, mut f: F) -> Result<SecretFields<V>, E>
    where
        F: FnMut(&T, Option<&U>) -> Result<V, E>,
    {
        let mut field = |mine: &Option<T>, theirs: &Option<U>| {
            mine.as_ref().map(|value| f(value, theirs.as_ref())).transpose()
        };
        Ok(SecretFields {
            name: field(&self.name, &other.name)?,
            url: field(&self.url, &other.url)?,
            username: field(&self.username, &other.username)?,
            password: field(&self.password, &other.password)?,
            notes: field(&self.notes, &other.notes)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        [&self.name, &self.url, &self.username, &self.password, &self.notes]
            .into_iter()
            .flatten()
    }
}
