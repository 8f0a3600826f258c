use candid::{CandidType, Principal};
use serde::{Deserialize, Serialize};

/// Represents a single entry in the audit log for a policy.
#[derive(CandidType, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuditLogEntry {
    /// Nanoseconds since epoch.
    pub timestamp: u64,
    /// Principal of the actor performing the action. The canister itself for
    /// condition sweeps.
    pub actor: Principal,
    pub action: LogAction,
    /// Optional details about the action (e.g. condition id, vote).
    pub details: Option<String>,
    pub policy_id: Principal,
}

#[derive(CandidType, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum LogAction {
    PolicyCreated,
    PolicyUpdated,
    SecretRemoved,
    VoteCast,
    ConditionSatisfied,
    PolicyDisclosed,
    KeyDerivationGranted,
    KeyDerivationDenied,
}
