// src/backend/models/user.rs
use crate::models::common::{EncryptedBlob, PolicyId, SecretId, Timestamp, UserId};
use candid::CandidType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub secrets: Vec<SecretId>,
    pub policies: Vec<PolicyId>,
    /// Envelope keys of the user's secrets, wrapped under the user's root key.
    pub key_box: BTreeMap<SecretId, EncryptedBlob>,
    pub date_created: Timestamp,
    pub date_modified: Timestamp,
    pub date_last_login: Timestamp,
}

impl User {
    pub fn new(id: UserId, now: Timestamp) -> Self {
        Self {
            id,
            name: None,
            email: None,
            secrets: Vec::new(),
            policies: Vec::new(),
            key_box: BTreeMap::new(),
            date_created: now,
            date_modified: now,
            date_last_login: now,
        }
    }
}
