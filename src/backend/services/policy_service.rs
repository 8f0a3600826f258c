// src/backend/services/policy_service.rs

use crate::{
    error::VaultError,
    metrics,
    models::{
        audit_log::{AuditLogEntry, LogAction},
        common::{EncryptedBlob, PolicyId, PrincipalId, Role, SecretId, Timestamp, UserId},
        condition::{Condition, ConditionArgs, LogicalOperator, Vote},
        policy::{BeneficiaryPolicyEntry, Policy, ValidatorPolicyView},
    },
    services::{
        access_gate,
        condition_engine::{self, EvaluationContext, EvaluationOutcome},
        secret_service::validate_wrapped_key,
        user_service::load_user,
    },
    storage,
    utils::{
        crypto::generate_unique_principal,
        guards::check_authenticated,
        validation::validate_request,
    },
};
use candid::CandidType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use validator::Validate;

#[derive(CandidType, Deserialize, Clone, Debug, Default, Validate)]
pub struct AddPolicyRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
}

/// A secret to cover. The key is the secret's envelope key wrapped under the
/// policy's root key; it may be omitted for a secret the policy already covers.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug)]
pub struct PolicySecretEntry {
    pub secret_id: SecretId,
    pub encrypted_symmetric_key: Option<EncryptedBlob>,
}

#[derive(CandidType, Deserialize, Clone, Debug, Validate)]
pub struct ConditionSet {
    #[validate(length(max = 32))]
    pub conditions: Vec<ConditionArgs>,
    pub logical_operator: Option<LogicalOperator>,
}

/// Fields left as `None` are kept. Present collections replace the stored
/// ones wholesale; replaced conditions start over as pending.
#[derive(CandidType, Deserialize, Clone, Debug, Validate)]
pub struct UpdatePolicyRequest {
    pub id: PolicyId,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 64))]
    pub beneficiaries: Option<Vec<PrincipalId>>,
    #[validate(length(max = 256))]
    pub secrets: Option<Vec<PolicySecretEntry>>,
    pub conditions: Option<ConditionSet>,
}

pub(crate) fn audit(
    now: Timestamp,
    actor: PrincipalId,
    action: LogAction,
    policy_id: PolicyId,
    details: Option<String>,
) {
    storage::audit_logs::add_entry(AuditLogEntry {
        timestamp: now,
        actor,
        action,
        details,
        policy_id,
    });
}

fn load_policy(id: &PolicyId) -> Result<Policy, VaultError> {
    storage::policies::get_policy(id).ok_or_else(|| VaultError::PolicyNotFound(id.to_text()))
}

/// LastLogin conditions measure from the owner's last login, or from policy
/// creation if the owner record is gone.
fn evaluation_context(policy: &Policy, now: Timestamp) -> EvaluationContext {
    let owner_last_login = storage::users::get_user(&policy.owner)
        .map(|owner| owner.date_last_login)
        .unwrap_or(policy.date_created);
    EvaluationContext { now, owner_last_login }
}

fn commit_evaluation(policy: &mut Policy) -> Result<(), VaultError> {
    if let Some(stored) = storage::policies::get_policy(&policy.id) {
        condition_engine::merge_status(&stored, policy);
    }
    storage::policies::commit_policy(policy)?;
    Ok(())
}

/// Metrics and audit entries for an evaluation that is already committed.
fn record_evaluation(
    policy: &Policy,
    outcome: &EvaluationOutcome,
    actor: PrincipalId,
    now: Timestamp,
) -> Result<(), VaultError> {
    metrics::record_disclosure_change(outcome.status_before, policy.conditions_status)?;

    for condition_id in &outcome.newly_satisfied {
        crate::log_info!("Condition {} of policy {} satisfied", condition_id, policy.id);
        audit(now, actor, LogAction::ConditionSatisfied, policy.id, Some(condition_id.to_text()));
    }
    if !outcome.status_before && policy.conditions_status {
        crate::log_info!("Policy {} now discloses to its beneficiaries", policy.id);
        audit(now, actor, LogAction::PolicyDisclosed, policy.id, None);
    }
    Ok(())
}

/// Writes an evaluated policy and records what changed.
fn persist_evaluation(
    policy: &mut Policy,
    outcome: &EvaluationOutcome,
    actor: PrincipalId,
    now: Timestamp,
) -> Result<(), VaultError> {
    commit_evaluation(policy)?;
    record_evaluation(policy, outcome, actor, now)
}

/// Re-evaluates the conditions of `policy` against `now` and persists the
/// result if anything changed. `actor` is recorded in the audit trail.
pub fn refresh_policy(mut policy: Policy, actor: PrincipalId, now: Timestamp) -> Result<Policy, VaultError> {
    let ctx = evaluation_context(&policy, now);
    let outcome = condition_engine::evaluate_policy(&mut policy, &ctx);
    if outcome.changed() {
        persist_evaluation(&mut policy, &outcome, actor, now)?;
    }
    Ok(policy)
}

pub fn add_policy(caller: UserId, request: AddPolicyRequest, now: Timestamp) -> Result<Policy, VaultError> {
    check_authenticated(caller)?;
    validate_request(&request)?;

    let mut user = load_user(&caller)?;
    let policy = Policy::new(generate_unique_principal()?, caller, request.name, now);
    storage::policies::commit_policy(&policy)?;

    user.policies.push(policy.id);
    user.date_modified = now;
    storage::users::insert_user(&user);

    metrics::record_policies(1)?;
    audit(now, caller, LogAction::PolicyCreated, policy.id, None);
    crate::log_info!("User {} created policy {}", caller, policy.id);
    Ok(policy)
}

pub fn get_policy_as_owner(caller: UserId, id: PolicyId) -> Result<Policy, VaultError> {
    let policy = load_policy(&id)?;
    access_gate::authorize_mutation(&policy, &caller)?;
    Ok(policy)
}

/// Full policy for a beneficiary whose conditions are met. Conditions are
/// re-evaluated before the check.
pub fn get_policy_as_beneficiary(caller: UserId, id: PolicyId, now: Timestamp) -> Result<Policy, VaultError> {
    let policy = load_policy(&id)?;
    if access_gate::resolve_role(&policy, &caller).is_none() {
        return Err(VaultError::PolicyNotFound(id.to_text()));
    }
    let policy = refresh_policy(policy, caller, now)?;
    match access_gate::authorize_metadata_read(&policy, &caller)? {
        Role::Owner | Role::Beneficiary => Ok(policy),
        Role::Validator => Err(VaultError::NotAuthorized(
            "validators may only read the conditions of a policy".to_string(),
        )),
    }
}

fn validator_view(policy: Policy, conditions: Vec<Condition>) -> ValidatorPolicyView {
    ValidatorPolicyView {
        policy_id: policy.id,
        owner: policy.owner,
        conditions,
        conditions_logical_operator: policy.conditions_logical_operator,
        conditions_status: policy.conditions_status,
    }
}

pub fn get_policy_as_validator(caller: UserId, id: PolicyId) -> Result<ValidatorPolicyView, VaultError> {
    let policy = load_policy(&id)?;
    access_gate::authorize_metadata_read(&policy, &caller)?;
    let conditions = policy.conditions.clone();
    Ok(validator_view(policy, conditions))
}

pub fn get_policy_list_as_owner(caller: UserId) -> Vec<Policy> {
    storage::policies::get_policies_by_owner(&caller)
}

pub fn get_policy_list_as_beneficiary(caller: UserId) -> Vec<BeneficiaryPolicyEntry> {
    storage::policies::find_policies(|p| p.is_beneficiary(&caller))
        .into_iter()
        .map(|p| BeneficiaryPolicyEntry {
            policy_id: p.id,
            owner: p.owner,
            conditions_status: p.conditions_status,
        })
        .collect()
}

/// Policies the caller votes on, each with only the conditions naming them.
pub fn get_policy_list_as_validator(caller: UserId) -> Vec<ValidatorPolicyView> {
    storage::policies::find_policies(|p| p.owner != caller && p.is_validator(&caller))
        .into_iter()
        .map(|p| {
            let conditions = p
                .conditions
                .iter()
                .filter(|c| c.as_x_out_of_y().is_some_and(|x| x.has_validator(&caller)))
                .cloned()
                .collect();
            validator_view(p, conditions)
        })
        .collect()
}

fn build_beneficiaries(owner: &UserId, requested: Vec<PrincipalId>) -> Result<BTreeSet<PrincipalId>, VaultError> {
    let mut beneficiaries = BTreeSet::new();
    for beneficiary in requested {
        if beneficiary == *owner || beneficiary == PrincipalId::anonymous() {
            return Err(VaultError::InvalidInput(format!(
                "{} cannot be a beneficiary of this policy",
                beneficiary
            )));
        }
        beneficiaries.insert(beneficiary);
    }
    Ok(beneficiaries)
}

/// Rebuilds `secrets` and `key_box` together from the request.
fn build_key_box(
    owner: &UserId,
    current: &BTreeMap<SecretId, EncryptedBlob>,
    entries: Vec<PolicySecretEntry>,
) -> Result<(BTreeSet<SecretId>, BTreeMap<SecretId, EncryptedBlob>), VaultError> {
    let mut secrets = BTreeSet::new();
    let mut key_box = BTreeMap::new();
    for entry in entries {
        storage::secrets::get_secret(&entry.secret_id)
            .filter(|secret| secret.owner == *owner)
            .ok_or_else(|| VaultError::SecretNotFound(entry.secret_id.to_text()))?;
        if !secrets.insert(entry.secret_id) {
            return Err(VaultError::InvalidInput(format!(
                "secret {} listed twice",
                entry.secret_id
            )));
        }
        let wrapped = match entry.encrypted_symmetric_key {
            Some(key) => {
                validate_wrapped_key(&key)?;
                Some(key)
            }
            None => current.get(&entry.secret_id).cloned(),
        };
        // A secret left without a key is caught by the commit check.
        if let Some(key) = wrapped {
            key_box.insert(entry.secret_id, key);
        }
    }
    Ok((secrets, key_box))
}

fn build_conditions(set: &ConditionSet, owner: &UserId) -> Result<Vec<Condition>, VaultError> {
    validate_request(set)?;
    condition_engine::validate_conditions(&set.conditions, set.logical_operator, owner)?;
    set.conditions
        .iter()
        .cloned()
        .map(|args| generate_unique_principal().map(|id| args.into_condition(id)))
        .collect()
}

pub fn update_policy(caller: UserId, request: UpdatePolicyRequest, now: Timestamp) -> Result<Policy, VaultError> {
    check_authenticated(caller)?;
    validate_request(&request)?;

    let stored = load_policy(&request.id)?;
    access_gate::authorize_mutation(&stored, &caller)?;
    let mut policy = stored.clone();

    if let Some(name) = request.name {
        policy.name = Some(name);
    }
    if let Some(beneficiaries) = request.beneficiaries {
        policy.beneficiaries = build_beneficiaries(&caller, beneficiaries)?;
    }
    if let Some(entries) = request.secrets {
        let (secrets, key_box) = build_key_box(&caller, &stored.key_box, entries)?;
        policy.secrets = secrets;
        policy.key_box = key_box;
    }
    if let Some(set) = &request.conditions {
        policy.conditions = build_conditions(set, &caller)?;
        policy.conditions_logical_operator = set.logical_operator;
        policy.conditions_status = false;
    }

    if let Some(both) = policy.beneficiaries.iter().find(|b| policy.is_validator(b)) {
        return Err(VaultError::InvalidCondition(format!(
            "{} cannot be both beneficiary and validator",
            both
        )));
    }

    let ctx = evaluation_context(&policy, now);
    let mut outcome = condition_engine::evaluate_policy(&mut policy, &ctx);
    outcome.status_before = stored.conditions_status;
    policy.date_modified = now;

    storage::policies::commit_policy(&policy)?;
    metrics::record_disclosure_change(outcome.status_before, policy.conditions_status)?;

    audit(now, caller, LogAction::PolicyUpdated, policy.id, None);
    for condition_id in &outcome.newly_satisfied {
        audit(now, caller, LogAction::ConditionSatisfied, policy.id, Some(condition_id.to_text()));
    }
    if !outcome.status_before && policy.conditions_status {
        audit(now, caller, LogAction::PolicyDisclosed, policy.id, None);
    }
    crate::log_info!(
        "User {} updated policy {}: {} secrets, {} beneficiaries, {} conditions, disclosed={}",
        caller,
        policy.id,
        policy.secrets.len(),
        policy.beneficiaries.len(),
        policy.conditions.len(),
        policy.conditions_status
    );
    Ok(policy)
}

pub fn remove_policy(caller: UserId, id: PolicyId, now: Timestamp) -> Result<(), VaultError> {
    check_authenticated(caller)?;
    let policy = load_policy(&id)?;
    access_gate::authorize_mutation(&policy, &caller)?;

    storage::policies::remove_policy(&id);
    storage::audit_logs::remove_entries(&id);
    if let Some(mut user) = storage::users::get_user(&caller) {
        user.policies.retain(|p| *p != id);
        user.date_modified = now;
        storage::users::insert_user(&user);
    }

    metrics::record_policies(-1)?;
    metrics::record_disclosure_change(policy.conditions_status, false)?;
    crate::log_info!("User {} removed policy {}", caller, id);
    Ok(())
}

/// Casts the caller's vote on every XOutOfY condition of the policy that
/// lists them.
pub fn confirm_x_out_of_y_condition(
    caller: PrincipalId,
    policy_id: PolicyId,
    vote: Vote,
    now: Timestamp,
) -> Result<Policy, VaultError> {
    check_authenticated(caller)?;
    let mut policy = load_policy(&policy_id)?;
    access_gate::authorize_vote(&policy, &caller)?;

    let status_before = policy.conditions_status;
    let newly_satisfied = condition_engine::cast_vote(&mut policy, &caller, vote)?;
    let outcome = EvaluationOutcome {
        newly_satisfied,
        status_before,
        status_after: policy.conditions_status,
    };
    policy.date_modified = now;

    commit_evaluation(&mut policy)?;
    metrics::record_vote()?;
    audit(now, caller, LogAction::VoteCast, policy.id, Some(format!("{:?}", vote)));
    record_evaluation(&policy, &outcome, caller, now)?;
    Ok(policy)
}

pub fn get_audit_log(caller: UserId, policy_id: PolicyId) -> Result<Vec<AuditLogEntry>, VaultError> {
    let policy = load_policy(&policy_id)?;
    access_gate::authorize_mutation(&policy, &caller)?;
    Ok(storage::audit_logs::get_entries(&policy_id))
}
