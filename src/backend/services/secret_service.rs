// src/backend/services/secret_service.rs
// Secrets arrive already encrypted: field ciphertexts plus the envelope key
// wrapped under the owner's root key. The backend stores and gates them.

use crate::{
    crypto::envelope::WRAPPED_KEY_SIZE,
    error::VaultError,
    metrics,
    models::{
        audit_log::LogAction,
        common::{EncryptedBlob, PolicyId, SecretCategory, SecretFields, SecretId, Timestamp, UserId},
        secret::{DisclosedSecret, Secret},
    },
    services::{access_gate, policy_service, user_service::load_user},
    storage,
    utils::{
        crypto::generate_unique_principal,
        guards::check_authenticated,
        validation::{validate_blob, validate_fields},
    },
};
use candid::CandidType;
use serde::Deserialize;

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct AddSecretRequest {
    pub category: SecretCategory,
    pub fields: SecretFields<EncryptedBlob>,
    /// Envelope key wrapped under the owner's root key.
    pub encrypted_symmetric_key: EncryptedBlob,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct UpdateSecretRequest {
    pub id: SecretId,
    pub category: SecretCategory,
    /// Replaces all fields. Re-encrypted under the unchanged envelope key.
    pub fields: SecretFields<EncryptedBlob>,
}

pub(crate) fn validate_wrapped_key(key: &EncryptedBlob) -> Result<(), VaultError> {
    validate_blob("encrypted symmetric key", key)?;
    if key.len() != WRAPPED_KEY_SIZE {
        return Err(VaultError::InvalidInput(format!(
            "encrypted symmetric key must be {} bytes, got {}",
            WRAPPED_KEY_SIZE,
            key.len()
        )));
    }
    Ok(())
}

/// Loads a secret owned by `caller`. Other callers learn nothing about it.
fn load_owned_secret(caller: &UserId, id: &SecretId) -> Result<Secret, VaultError> {
    storage::secrets::get_secret(id)
        .filter(|secret| secret.owner == *caller)
        .ok_or_else(|| VaultError::SecretNotFound(id.to_text()))
}

pub fn add_secret(caller: UserId, request: AddSecretRequest, now: Timestamp) -> Result<Secret, VaultError> {
    check_authenticated(caller)?;
    validate_fields(&request.fields)?;
    validate_wrapped_key(&request.encrypted_symmetric_key)?;

    let mut user = load_user(&caller)?;
    let secret = Secret {
        id: generate_unique_principal()?,
        owner: caller,
        category: request.category,
        fields: request.fields,
        date_created: now,
        date_modified: now,
    };

    user.secrets.push(secret.id);
    user.key_box.insert(secret.id, request.encrypted_symmetric_key);
    user.date_modified = now;

    storage::secrets::insert_secret(&secret);
    storage::users::insert_user(&user);
    metrics::record_secrets(1)?;
    crate::log_info!("User {} added secret {}", caller, secret.id);
    Ok(secret)
}

pub fn update_secret(caller: UserId, request: UpdateSecretRequest, now: Timestamp) -> Result<Secret, VaultError> {
    check_authenticated(caller)?;
    validate_fields(&request.fields)?;

    let mut secret = load_owned_secret(&caller, &request.id)?;
    secret.category = request.category;
    secret.fields = request.fields;
    secret.date_modified = now;

    storage::secrets::insert_secret(&secret);
    crate::log_info!("User {} updated secret {}", caller, secret.id);
    Ok(secret)
}

pub fn get_secret(caller: UserId, id: SecretId) -> Result<Secret, VaultError> {
    load_owned_secret(&caller, &id)
}

/// The envelope key of `id` wrapped under the caller's own root key.
pub fn get_secret_symmetric_key(caller: UserId, id: SecretId) -> Result<EncryptedBlob, VaultError> {
    let user = load_user(&caller)?;
    user.key_box
        .get(&id)
        .cloned()
        .ok_or_else(|| VaultError::SecretNotFound(id.to_text()))
}

/// A secret read through a policy. Conditions are re-evaluated first, so the
/// decision reflects the current time and votes.
pub fn get_secret_as_beneficiary(
    caller: UserId,
    secret_id: SecretId,
    policy_id: PolicyId,
    now: Timestamp,
) -> Result<DisclosedSecret, VaultError> {
    let policy = storage::policies::get_policy(&policy_id)
        .filter(|policy| access_gate::resolve_role(policy, &caller).is_some())
        .ok_or(VaultError::CallerNotBeneficiary)?;
    let policy = policy_service::refresh_policy(policy, caller, now)?;
    access_gate::authorize_disclosure(&policy, &caller)?;

    let encrypted_symmetric_key = policy
        .key_box
        .get(&secret_id)
        .cloned()
        .ok_or_else(|| VaultError::SecretNotFound(secret_id.to_text()))?;
    let secret = storage::secrets::get_secret(&secret_id)
        .ok_or_else(|| VaultError::SecretNotFound(secret_id.to_text()))?;

    Ok(DisclosedSecret {
        secret,
        encrypted_symmetric_key,
    })
}

/// Deletes a secret and removes it from every policy that covers it.
/// All writes happen in this one call, so no policy is ever left pointing at
/// a missing secret.
pub fn remove_secret(caller: UserId, id: SecretId, now: Timestamp) -> Result<(), VaultError> {
    check_authenticated(caller)?;
    load_owned_secret(&caller, &id)?;
    let mut user = load_user(&caller)?;

    let mut covering = storage::policies::find_policies(|p| p.owner == caller && p.secrets.contains(&id));
    for policy in covering.iter_mut() {
        policy.remove_secret(&id);
        policy.date_modified = now;
        policy.check_key_box_consistency()?;
    }
    for policy in &covering {
        storage::policies::commit_policy(policy)?;
        policy_service::audit(now, caller, LogAction::SecretRemoved, policy.id, Some(id.to_text()));
    }

    user.secrets.retain(|s| *s != id);
    user.key_box.remove(&id);
    user.date_modified = now;
    storage::users::insert_user(&user);
    storage::secrets::remove_secret(&id);
    metrics::record_secrets(-1)?;

    crate::log_info!(
        "User {} removed secret {} (cascaded to {} policies)",
        caller,
        id,
        covering.len()
    );
    Ok(())
}
