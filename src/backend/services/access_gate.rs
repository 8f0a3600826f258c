// src/backend/services/access_gate.rs
//! Role resolution and the per-operation access matrix for policies.
//!
//! Checks read the policy's cached `conditions_status`; callers that need a
//! fresh value evaluate the policy first.

use crate::error::VaultError;
use crate::models::common::{PrincipalId, Role};
use crate::models::policy::Policy;

/// Owner wins over beneficiary, beneficiary over validator.
pub fn resolve_role(policy: &Policy, caller: &PrincipalId) -> Option<Role> {
    if *caller == policy.owner {
        Some(Role::Owner)
    } else if policy.is_beneficiary(caller) {
        Some(Role::Beneficiary)
    } else if policy.is_validator(caller) {
        Some(Role::Validator)
    } else {
        None
    }
}

fn not_found(policy: &Policy) -> VaultError {
    VaultError::PolicyNotFound(policy.id.to_text())
}

/// Reading policy metadata. Returns the role so the caller can shape the view:
/// validators only get the conditions.
pub fn authorize_metadata_read(policy: &Policy, caller: &PrincipalId) -> Result<Role, VaultError> {
    match resolve_role(policy, caller) {
        Some(Role::Owner) => Ok(Role::Owner),
        Some(Role::Beneficiary) if policy.conditions_status => Ok(Role::Beneficiary),
        Some(Role::Beneficiary) => Err(VaultError::InvalidPolicyCondition(policy.id.to_text())),
        Some(Role::Validator) => Ok(Role::Validator),
        None => Err(not_found(policy)),
    }
}

/// Reading secrets (and their wrapped keys) through the policy. A pending
/// beneficiary gets exactly the error a stranger gets.
pub fn authorize_disclosure(policy: &Policy, caller: &PrincipalId) -> Result<Role, VaultError> {
    match resolve_role(policy, caller) {
        Some(Role::Owner) => Ok(Role::Owner),
        Some(Role::Beneficiary) if policy.conditions_status => Ok(Role::Beneficiary),
        _ => Err(VaultError::CallerNotBeneficiary),
    }
}

pub fn authorize_vote(policy: &Policy, caller: &PrincipalId) -> Result<(), VaultError> {
    match resolve_role(policy, caller) {
        Some(Role::Validator) => Ok(()),
        Some(Role::Owner) => Err(VaultError::NotAuthorized(
            "the owner cannot vote on their own policy".to_string(),
        )),
        Some(Role::Beneficiary) => Err(VaultError::NotAuthorized(
            "beneficiaries cannot vote".to_string(),
        )),
        None => Err(not_found(policy)),
    }
}

/// Changing or deleting the policy.
pub fn authorize_mutation(policy: &Policy, caller: &PrincipalId) -> Result<(), VaultError> {
    match resolve_role(policy, caller) {
        Some(Role::Owner) => Ok(()),
        Some(_) => Err(VaultError::NotAuthorized(format!(
            "only the owner can modify policy {}",
            policy.id
        ))),
        None => Err(not_found(policy)),
    }
}

/// Root key derivation for a policy context. Every denial, including an
/// unknown policy, is the same `KeyGenerationNotAllowed`.
pub fn authorize_key_derivation(policy: Option<&Policy>, caller: &PrincipalId) -> Result<Role, VaultError> {
    let policy = policy.ok_or(VaultError::KeyGenerationNotAllowed)?;
    authorize_disclosure(policy, caller).map_err(|_| VaultError::KeyGenerationNotAllowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::condition::{Condition, Validator, Vote, XOutOfY};
    use candid::Principal;

    const OWNER: u8 = 1;
    const BENEFICIARY: u8 = 2;
    const VALIDATOR: u8 = 3;
    const STRANGER: u8 = 4;

    fn principal(n: u8) -> Principal {
        Principal::from_slice(&[n; 29])
    }

    fn policy(disclosed: bool) -> Policy {
        let mut policy = Policy::new(principal(9), principal(OWNER), None, 0);
        policy.beneficiaries.insert(principal(BENEFICIARY));
        policy.conditions.push(Condition::XOutOfY(XOutOfY {
            id: principal(10),
            quorum: 1,
            validators: vec![Validator {
                id: principal(VALIDATOR),
                vote: Vote::Unset,
            }],
            condition_status: disclosed,
        }));
        policy.conditions_status = disclosed;
        policy
    }

    #[test]
    fn test_role_resolution() {
        let policy = policy(false);
        assert_eq!(resolve_role(&policy, &principal(OWNER)), Some(Role::Owner));
        assert_eq!(resolve_role(&policy, &principal(BENEFICIARY)), Some(Role::Beneficiary));
        assert_eq!(resolve_role(&policy, &principal(VALIDATOR)), Some(Role::Validator));
        assert_eq!(resolve_role(&policy, &principal(STRANGER)), None);
    }

    #[test]
    fn test_metadata_matrix() {
        let pending = policy(false);
        assert!(authorize_metadata_read(&pending, &principal(OWNER)).is_ok());
        assert!(matches!(
            authorize_metadata_read(&pending, &principal(BENEFICIARY)),
            Err(VaultError::InvalidPolicyCondition(_))
        ));
        assert_eq!(
            authorize_metadata_read(&pending, &principal(VALIDATOR)),
            Ok(Role::Validator)
        );
        assert!(matches!(
            authorize_metadata_read(&pending, &principal(STRANGER)),
            Err(VaultError::PolicyNotFound(_))
        ));

        let disclosed = policy(true);
        assert_eq!(
            authorize_metadata_read(&disclosed, &principal(BENEFICIARY)),
            Ok(Role::Beneficiary)
        );
    }

    #[test]
    fn test_pending_beneficiary_denied_like_stranger() {
        let pending = policy(false);
        let beneficiary = authorize_disclosure(&pending, &principal(BENEFICIARY)).unwrap_err();
        let stranger = authorize_disclosure(&pending, &principal(STRANGER)).unwrap_err();
        let validator = authorize_disclosure(&pending, &principal(VALIDATOR)).unwrap_err();
        assert_eq!(beneficiary, stranger);
        assert_eq!(validator, stranger);

        assert!(authorize_disclosure(&policy(true), &principal(BENEFICIARY)).is_ok());
        assert!(authorize_disclosure(&pending, &principal(OWNER)).is_ok());
    }

    #[test]
    fn test_vote_and_mutation_matrix() {
        let pending = policy(false);
        assert!(authorize_vote(&pending, &principal(VALIDATOR)).is_ok());
        assert!(authorize_vote(&pending, &principal(OWNER)).is_err());
        assert!(authorize_vote(&pending, &principal(BENEFICIARY)).is_err());

        assert!(authorize_mutation(&pending, &principal(OWNER)).is_ok());
        for who in [BENEFICIARY, VALIDATOR] {
            assert!(matches!(
                authorize_mutation(&policy(true), &principal(who)),
                Err(VaultError::NotAuthorized(_))
            ));
        }
        assert!(matches!(
            authorize_mutation(&pending, &principal(STRANGER)),
            Err(VaultError::PolicyNotFound(_))
        ));
    }

    #[test]
    fn test_key_derivation_denials_are_uniform() {
        let pending = policy(false);
        for who in [BENEFICIARY, VALIDATOR, STRANGER] {
            assert_eq!(
                authorize_key_derivation(Some(&pending), &principal(who)),
                Err(VaultError::KeyGenerationNotAllowed)
            );
        }
        assert_eq!(
            authorize_key_derivation(None, &principal(OWNER)),
            Err(VaultError::KeyGenerationNotAllowed)
        );
        assert_eq!(
            authorize_key_derivation(Some(&policy(true)), &principal(BENEFICIARY)),
            Ok(Role::Beneficiary)
        );
    }
}
