// src/backend/models/secret.rs
use crate::models::common::{EncryptedBlob, SecretCategory, SecretFields, SecretId, Timestamp, UserId};
use candid::CandidType;
use serde::{Deserialize, Serialize};

/// A stored secret. Every populated field was encrypted with the same
/// envelope key, which only exists here in wrapped form inside key boxes.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Secret {
    pub id: SecretId,
    pub owner: UserId,
    pub category: SecretCategory,
    pub fields: SecretFields<EncryptedBlob>,
    pub date_created: Timestamp,
    pub date_modified: Timestamp,
}

/// What a beneficiary receives once a policy discloses: the ciphertexts plus
/// the envelope key wrapped under the policy's root key.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DisclosedSecret {
    pub secret: Secret,
    pub encrypted_symmetric_key: EncryptedBlob,
}
