// src/backend/api.rs
// Candid endpoints. The only module that reads the caller and the clock;
// everything below takes them as arguments.

use crate::{
    adapter::remote_kds::RemoteKeyService,
    crypto::key_derivation::{DerivationContext, EncryptedKeyReply},
    error::VaultError,
    metrics::CoreMetrics,
    models::{
        audit_log::AuditLogEntry,
        common::{EncryptedBlob, PolicyId, SecretId},
        condition::Vote,
        init::{DerivationSettings, InitArgs},
        policy::{BeneficiaryPolicyEntry, Policy, ValidatorPolicyView},
        secret::{DisclosedSecret, Secret},
        user::User,
    },
    services::{
        key_service,
        policy_service::{self, AddPolicyRequest, UpdatePolicyRequest},
        scheduler::{self, SweepReport},
        secret_service::{self, AddSecretRequest, UpdateSecretRequest},
        user_service::{self, SecretListEntry, UpdateUserProfileRequest},
    },
    storage,
    utils::{guards::check_admin, rng::initialize_internal_rng, time::get_current_time_ns},
};
use candid::CandidType;
use ic_cdk::api::canister_balance128;
use ic_cdk::caller;
use ic_cdk_macros::{init, post_upgrade, query, update};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// --- Guard Functions ---

/// Checks if the caller is the configured admin principal.
fn admin_guard() -> Result<(), String> {
    check_admin(caller(), storage::config::get_admin_principal()).map_err(|e| e.to_string())
}

fn key_service_client() -> Result<RemoteKeyService, VaultError> {
    RemoteKeyService::from_config(&storage::config::get_key_service_config())
}

// --- Lifecycle ---

fn start_timers() {
    // Inter-canister calls are not allowed in init/post_upgrade.
    ic_cdk_timers::set_timer(Duration::ZERO, || {
        ic_cdk::spawn(async {
            if let Err(e) = initialize_internal_rng().await {
                crate::log_error!("Failed to seed internal RNG: {}", e);
            }
        })
    });

    let interval = Duration::from_secs(storage::config::get_sweep_interval_secs());
    ic_cdk_timers::set_timer_interval(interval, || {
        if let Err(e) = scheduler::run_condition_sweep(ic_cdk::id(), get_current_time_ns()) {
            crate::log_error!("Scheduled condition sweep failed: {}", e);
        }
    });
}

#[init]
fn init(args: InitArgs) {
    if let Err(e) = storage::config::init_config(&args) {
        ic_cdk::trap(&format!("Invalid init arguments: {}", e));
    }
    start_timers();
    crate::log_info!("Keepsake backend canister initialized.");
}

#[post_upgrade]
fn post_upgrade() {
    start_timers();
    crate::log_info!("Keepsake backend canister upgraded.");
}

// --- User Endpoints ---

#[update]
fn register_user() -> Result<User, VaultError> {
    user_service::register_user(caller(), get_current_time_ns())
}

#[update]
fn update_user_profile(req: UpdateUserProfileRequest) -> Result<User, VaultError> {
    user_service::update_user_profile(caller(), req, get_current_time_ns())
}

#[query]
fn get_user() -> Result<User, VaultError> {
    user_service::get_user(caller())
}

#[update]
fn delete_user() -> Result<(), VaultError> {
    user_service::delete_user(caller())
}

// --- Secret Endpoints ---

#[update]
fn add_secret(req: AddSecretRequest) -> Result<Secret, VaultError> {
    secret_service::add_secret(caller(), req, get_current_time_ns())
}

#[update]
fn update_secret(req: UpdateSecretRequest) -> Result<Secret, VaultError> {
    secret_service::update_secret(caller(), req, get_current_time_ns())
}

#[update]
fn remove_secret(secret_id: SecretId) -> Result<(), VaultError> {
    secret_service::remove_secret(caller(), secret_id, get_current_time_ns())
}

#[query]
fn get_secret(secret_id: SecretId) -> Result<Secret, VaultError> {
    secret_service::get_secret(caller(), secret_id)
}

#[query]
fn get_secret_list() -> Result<Vec<SecretListEntry>, VaultError> {
    user_service::get_secret_list(caller())
}

#[query]
fn get_secret_symmetric_key(secret_id: SecretId) -> Result<EncryptedBlob, VaultError> {
    secret_service::get_secret_symmetric_key(caller(), secret_id)
}

// Update, not query: re-evaluated conditions are persisted.
#[update]
fn get_secret_as_beneficiary(secret_id: SecretId, policy_id: PolicyId) -> Result<DisclosedSecret, VaultError> {
    secret_service::get_secret_as_beneficiary(caller(), secret_id, policy_id, get_current_time_ns())
}

// --- Policy Endpoints ---

#[update]
fn add_policy(req: AddPolicyRequest) -> Result<Policy, VaultError> {
    policy_service::add_policy(caller(), req, get_current_time_ns())
}

#[update]
fn update_policy(req: UpdatePolicyRequest) -> Result<Policy, VaultError> {
    policy_service::update_policy(caller(), req, get_current_time_ns())
}

#[update]
fn remove_policy(policy_id: PolicyId) -> Result<(), VaultError> {
    policy_service::remove_policy(caller(), policy_id, get_current_time_ns())
}

#[query]
fn get_policy_as_owner(policy_id: PolicyId) -> Result<Policy, VaultError> {
    policy_service::get_policy_as_owner(caller(), policy_id)
}

#[update]
fn get_policy_as_beneficiary(policy_id: PolicyId) -> Result<Policy, VaultError> {
    policy_service::get_policy_as_beneficiary(caller(), policy_id, get_current_time_ns())
}

#[query]
fn get_policy_as_validator(policy_id: PolicyId) -> Result<ValidatorPolicyView, VaultError> {
    policy_service::get_policy_as_validator(caller(), policy_id)
}

#[query]
fn get_policy_list_as_owner() -> Vec<Policy> {
    policy_service::get_policy_list_as_owner(caller())
}

#[query]
fn get_policy_list_as_beneficiary() -> Vec<BeneficiaryPolicyEntry> {
    policy_service::get_policy_list_as_beneficiary(caller())
}

#[query]
fn get_policy_list_as_validator() -> Vec<ValidatorPolicyView> {
    policy_service::get_policy_list_as_validator(caller())
}

#[update]
fn confirm_x_out_of_y_condition(policy_id: PolicyId, vote: Vote) -> Result<(), VaultError> {
    policy_service::confirm_x_out_of_y_condition(caller(), policy_id, vote, get_current_time_ns()).map(|_| ())
}

#[query]
fn get_audit_log(policy_id: PolicyId) -> Result<Vec<AuditLogEntry>, VaultError> {
    policy_service::get_audit_log(caller(), policy_id)
}

// --- Key Derivation Endpoints ---

#[update]
async fn get_encrypted_root_key(
    context: DerivationContext,
    transport_public_key: Vec<u8>,
) -> Result<EncryptedKeyReply, VaultError> {
    let service = key_service_client()?;
    key_service::get_encrypted_root_key(&service, caller(), context, transport_public_key, get_current_time_ns()).await
}

#[update]
async fn get_root_key_verification_key() -> Result<Vec<u8>, VaultError> {
    let service = key_service_client()?;
    key_service::get_root_key_verification_key(&service).await
}

#[query]
fn get_derivation_settings() -> DerivationSettings {
    DerivationSettings {
        key_name: storage::config::get_key_service_config().key_name,
        retry_limit: storage::config::get_derivation_retry_limit(),
    }
}

// --- Admin Endpoints ---

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, Default)]
pub struct GetMetricsResponse {
    pub metrics: CoreMetrics,
    pub cycle_balance: u128,
}

#[query(guard = "admin_guard")]
fn get_metrics() -> GetMetricsResponse {
    GetMetricsResponse {
        metrics: storage::get_metrics(),
        cycle_balance: canister_balance128(),
    }
}

#[update(guard = "admin_guard")]
fn run_condition_sweep() -> Result<SweepReport, VaultError> {
    scheduler::run_condition_sweep(caller(), get_current_time_ns())
}

ic_cdk::export_candid!();
