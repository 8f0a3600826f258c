// src/backend/services/user_service.rs

use crate::{
    error::VaultError,
    metrics,
    models::{
        common::{EncryptedBlob, SecretCategory, SecretId, Timestamp, UserId},
        user::User,
    },
    services::policy_service,
    storage,
    utils::{guards::check_authenticated, validation::validate_request},
};
use candid::CandidType;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(CandidType, Deserialize, Clone, Debug, Default, Validate)]
pub struct UpdateUserProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(email, length(max = 254))]
    pub email: Option<String>,
}

/// One row of the owner's secret list. The name stays encrypted.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SecretListEntry {
    pub id: SecretId,
    pub category: SecretCategory,
    pub name: Option<EncryptedBlob>,
}

pub(crate) fn load_user(id: &UserId) -> Result<User, VaultError> {
    storage::users::get_user(id).ok_or_else(|| VaultError::UserNotFound(id.to_text()))
}

/// Creates the caller's user on first call and stamps the login time on
/// every call. The login time feeds LastLogin conditions, so the caller's
/// policies are evaluated against the previous login before it is replaced.
pub fn register_user(caller: UserId, now: Timestamp) -> Result<User, VaultError> {
    check_authenticated(caller)?;

    let user = match storage::users::get_user(&caller) {
        Some(mut user) => {
            for policy in storage::policies::get_policies_by_owner(&caller) {
                policy_service::refresh_policy(policy, caller, now)?;
            }
            user.date_last_login = now;
            user
        }
        None => {
            metrics::record_users(1)?;
            crate::log_info!("Registered user {}", caller);
            User::new(caller, now)
        }
    };
    storage::users::insert_user(&user);
    Ok(user)
}

pub fn update_user_profile(
    caller: UserId,
    request: UpdateUserProfileRequest,
    now: Timestamp,
) -> Result<User, VaultError> {
    check_authenticated(caller)?;
    validate_request(&request)?;

    let mut user = load_user(&caller)?;
    user.name = request.name;
    user.email = request.email;
    user.date_modified = now;
    storage::users::insert_user(&user);
    Ok(user)
}

pub fn get_user(caller: UserId) -> Result<User, VaultError> {
    load_user(&caller)
}

/// Removes the caller and every secret they own. Refused while the caller
/// still owns a policy, since beneficiaries may depend on it.
pub fn delete_user(caller: UserId) -> Result<(), VaultError> {
    check_authenticated(caller)?;
    let user = load_user(&caller)?;

    let owned = storage::policies::get_policies_by_owner(&caller);
    if !owned.is_empty() {
        return Err(VaultError::UserHasPolicies(format!(
            "user {} still owns {} policies",
            caller,
            owned.len()
        )));
    }

    for secret_id in &user.secrets {
        storage::secrets::remove_secret(secret_id);
    }
    storage::users::remove_user(&caller);
    metrics::record_secrets(-(user.secrets.len() as i64))?;
    metrics::record_users(-1)?;
    crate::log_info!("Deleted user {} and {} secrets", caller, user.secrets.len());
    Ok(())
}

pub fn get_secret_list(caller: UserId) -> Result<Vec<SecretListEntry>, VaultError> {
    let user = load_user(&caller)?;
    Ok(user
        .secrets
        .iter()
        .filter_map(storage::secrets::get_secret)
        .map(|secret| SecretListEntry {
            id: secret.id,
            category: secret.category,
            name: secret.fields.name,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candid::Principal;

    fn alice() -> Principal {
        Principal::from_slice(&[1; 29])
    }

    #[test]
    fn test_register_is_idempotent_and_stamps_login() {
        let first = register_user(alice(), 100).unwrap();
        let second = register_user(alice(), 500).unwrap();
        assert_eq!(first.date_created, second.date_created);
        assert_eq!(second.date_last_login, 500);
        assert_eq!(storage::get_metrics().total_users, 1);
    }

    #[test]
    fn test_anonymous_cannot_register() {
        assert!(matches!(
            register_user(Principal::anonymous(), 1),
            Err(VaultError::NotAuthorized(_))
        ));
    }

    #[test]
    fn test_profile_update_validated() {
        register_user(alice(), 1).unwrap();
        let bad = UpdateUserProfileRequest {
            name: Some(String::new()),
            email: None,
        };
        assert!(matches!(
            update_user_profile(alice(), bad, 2),
            Err(VaultError::InvalidInput(_))
        ));

        let good = UpdateUserProfileRequest {
            name: Some("Alice".to_string()),
            email: Some("alice@example.org".to_string()),
        };
        let user = update_user_profile(alice(), good, 2).unwrap();
        assert_eq!(user.name.as_deref(), Some("Alice"));
        assert_eq!(user.date_modified, 2);
    }

    #[test]
    fn test_login_after_threshold_keeps_condition_met() {
        use crate::models::common::NANOS_PER_DAY;
        use crate::models::condition::ConditionArgs;
        use crate::services::policy_service::{
            add_policy, get_policy_as_beneficiary, update_policy, AddPolicyRequest, ConditionSet,
            UpdatePolicyRequest,
        };
        use crate::utils::rng::seed_internal_rng;

        seed_internal_rng([2u8; 32]);
        let beneficiary = Principal::from_slice(&[2; 29]);
        register_user(alice(), 0).unwrap();
        let policy = add_policy(alice(), AddPolicyRequest::default(), 0).unwrap();
        update_policy(
            alice(),
            UpdatePolicyRequest {
                id: policy.id,
                name: None,
                beneficiaries: Some(vec![beneficiary]),
                secrets: None,
                conditions: Some(ConditionSet {
                    conditions: vec![ConditionArgs::LastLogin {
                        number_of_days_since_last_login: 30,
                    }],
                    logical_operator: None,
                }),
            },
            0,
        )
        .unwrap();

        register_user(alice(), 40 * NANOS_PER_DAY).unwrap();
        let seen = get_policy_as_beneficiary(beneficiary, policy.id, 41 * NANOS_PER_DAY).unwrap();
        assert!(seen.conditions_status);
        assert!(seen.conditions[0].is_satisfied());
    }

    #[test]
    fn test_unknown_user() {
        assert!(matches!(get_user(alice()), Err(VaultError::UserNotFound(_))));
    }
}
