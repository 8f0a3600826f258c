// src/backend/models/policy.rs
use crate::error::VaultError;
use crate::models::common::{EncryptedBlob, PolicyId, PrincipalId, SecretId, Timestamp, UserId};
use crate::models::condition::{Condition, LogicalOperator};
use candid::CandidType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A conditional-disclosure policy over a set of the owner's secrets.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    pub id: PolicyId,
    pub owner: UserId,
    pub name: Option<String>,
    pub secrets: BTreeSet<SecretId>,
    pub beneficiaries: BTreeSet<PrincipalId>,
    pub conditions: Vec<Condition>,
    pub conditions_logical_operator: Option<LogicalOperator>,
    /// Cached aggregate of `conditions`; only refreshed by explicit evaluation.
    pub conditions_status: bool,
    /// Envelope keys of `secrets`, wrapped under the policy's root key.
    pub key_box: BTreeMap<SecretId, EncryptedBlob>,
    pub date_created: Timestamp,
    pub date_modified: Timestamp,
}

impl Policy {
    pub fn new(id: PolicyId, owner: UserId, name: Option<String>, now: Timestamp) -> Self {
        Self {
            id,
            owner,
            name,
            secrets: BTreeSet::new(),
            beneficiaries: BTreeSet::new(),
            conditions: Vec::new(),
            conditions_logical_operator: None,
            conditions_status: false,
            key_box: BTreeMap::new(),
            date_created: now,
            date_modified: now,
        }
    }

    pub fn is_beneficiary(&self, principal: &PrincipalId) -> bool {
        self.beneficiaries.contains(principal)
    }

    /// True if `principal` votes on any XOutOfY condition of this policy.
    pub fn is_validator(&self, principal: &PrincipalId) -> bool {
        self.conditions
            .iter()
            .filter_map(Condition::as_x_out_of_y)
            .any(|c| c.has_validator(principal))
    }

    /// Checks that `secrets` and the keys of `key_box` are the same set.
    pub fn check_key_box_consistency(&self) -> Result<(), VaultError> {
        let wrapped: BTreeSet<&SecretId> = self.key_box.keys().collect();
        let referenced: BTreeSet<&SecretId> = self.secrets.iter().collect();

        if let Some(missing) = referenced.difference(&wrapped).next() {
            return Err(VaultError::InconsistentKeyBox(format!(
                "secret {} of policy {} has no wrapped key",
                missing, self.id
            )));
        }
        if let Some(orphan) = wrapped.difference(&referenced).next() {
            return Err(VaultError::InconsistentKeyBox(format!(
                "wrapped key for {} is not a secret of policy {}",
                orphan, self.id
            )));
        }
        Ok(())
    }

    /// Drops a secret from both `secrets` and `key_box`.
    pub fn remove_secret(&mut self, secret_id: &SecretId) -> bool {
        let removed = self.secrets.remove(secret_id);
        let unwrapped = self.key_box.remove(secret_id).is_some();
        removed || unwrapped
    }
}

/// A policy as seen by one of its beneficiaries in a listing.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BeneficiaryPolicyEntry {
    pub policy_id: PolicyId,
    pub owner: UserId,
    pub conditions_status: bool,
}

/// What a validator may read of a policy: its conditions and nothing else.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ValidatorPolicyView {
    pub policy_id: PolicyId,
    pub owner: UserId,
    pub conditions: Vec<Condition>,
    pub conditions_logical_operator: Option<LogicalOperator>,
    pub conditions_status: bool,
}
