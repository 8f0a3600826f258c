// src/backend/error.rs
use candid::CandidType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of [`VaultError`] used by callers that only need to
/// know how to react (surface, retry, treat as denial).
#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidCondition,
    Inconsistent,
    CryptoFailure,
    KeyDenied,
    Transient,
    InvalidInput,
    Internal,
}

#[derive(CandidType, Deserialize, Serialize, Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Returned for any decrypt-via-policy attempt that is not allowed, whether
    /// the caller is a stranger or a beneficiary whose conditions are pending.
    #[error("Caller is not a beneficiary of this policy")]
    CallerNotBeneficiary,

    #[error("Policy conditions are not satisfied: {0}")]
    InvalidPolicyCondition(String),

    #[error("A logical operator requires at least two conditions")]
    LogicalOperatorWithLessThanTwoConditions,

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Secrets and key box are inconsistent: {0}")]
    InconsistentKeyBox(String),

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Key generation not allowed")]
    KeyGenerationNotAllowed,

    #[error("Transient key derivation failure: {0}")]
    TransientDerivationFailure(String),

    #[error("User still owns policies: {0}")]
    UserHasPolicies(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal canister error: {0}")]
    InternalError(String),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::UserNotFound(_)
            | VaultError::SecretNotFound(_)
            | VaultError::PolicyNotFound(_) => ErrorKind::NotFound,
            VaultError::NotAuthorized(_)
            | VaultError::CallerNotBeneficiary
            | VaultError::InvalidPolicyCondition(_)
            | VaultError::UserHasPolicies(_) => ErrorKind::Unauthorized,
            VaultError::LogicalOperatorWithLessThanTwoConditions
            | VaultError::InvalidCondition(_) => ErrorKind::InvalidCondition,
            VaultError::InconsistentKeyBox(_) => ErrorKind::Inconsistent,
            VaultError::DecryptionFailed => ErrorKind::CryptoFailure,
            VaultError::KeyGenerationNotAllowed => ErrorKind::KeyDenied,
            VaultError::TransientDerivationFailure(_) => ErrorKind::Transient,
            VaultError::InvalidInput(_) => ErrorKind::InvalidInput,
            VaultError::StorageError(_) | VaultError::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// Only transport hiccups towards the derivation service may be retried,
    /// and only with a fresh transport key pair.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
