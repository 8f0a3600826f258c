// src/backend/storage/config.rs
use crate::error::VaultError;
use crate::models::init::{
    InitArgs, KeyServiceConfig, DEFAULT_DERIVATION_RETRY_LIMIT, DEFAULT_SWEEP_INTERVAL_SECS,
};
use crate::storage::memory::{
    get_memory, Memory, ADMIN_PRINCIPAL_MEM_ID, KEY_SERVICE_MEM_ID, RETRY_LIMIT_MEM_ID,
    SWEEP_INTERVAL_MEM_ID,
};
use crate::storage::storable::Cbor;
use candid::Principal;
use ic_stable_structures::StableCell;
use std::cell::RefCell;

// The anonymous principal can never pass the admin guard, so an
// uninitialized canister has no admin.
const DEFAULT_ADMIN_PRINCIPAL: Principal = Principal::anonymous();

thread_local! {
    static ADMIN_PRINCIPAL: RefCell<StableCell<Cbor<Principal>, Memory>> = RefCell::new(
        StableCell::init(get_memory(ADMIN_PRINCIPAL_MEM_ID), Cbor(DEFAULT_ADMIN_PRINCIPAL))
            .expect("Failed to initialize admin principal stable cell")
    );

    static KEY_SERVICE: RefCell<StableCell<Cbor<KeyServiceConfig>, Memory>> = RefCell::new(
        StableCell::init(get_memory(KEY_SERVICE_MEM_ID), Cbor(KeyServiceConfig::default()))
            .expect("Failed to initialize key service stable cell")
    );

    static SWEEP_INTERVAL_SECS: RefCell<StableCell<u64, Memory>> = RefCell::new(
        StableCell::init(get_memory(SWEEP_INTERVAL_MEM_ID), DEFAULT_SWEEP_INTERVAL_SECS)
            .expect("Failed to initialize sweep interval stable cell")
    );

    static DERIVATION_RETRY_LIMIT: RefCell<StableCell<u32, Memory>> = RefCell::new(
        StableCell::init(get_memory(RETRY_LIMIT_MEM_ID), DEFAULT_DERIVATION_RETRY_LIMIT)
            .expect("Failed to initialize retry limit stable cell")
    );
}

fn storage_error<E: std::fmt::Debug>(what: &'static str) -> impl FnOnce(E) -> VaultError {
    move |e| VaultError::StorageError(format!("Failed to set {}: {:?}", what, e))
}

/// Persists the init arguments, filling unset options with defaults.
/// Called from `init` only; `post_upgrade` reads the stored values back.
pub fn init_config(args: &InitArgs) -> Result<(), VaultError> {
    let key_service = args.key_service.clone().unwrap_or_default();
    let sweep_interval = args
        .sweep_interval_secs
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    let retry_limit = args
        .derivation_retry_limit
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_DERIVATION_RETRY_LIMIT);

    ADMIN_PRINCIPAL.with(|cell| {
        cell.borrow_mut()
            .set(Cbor(args.admin_principal))
            .map_err(storage_error("admin principal"))
    })?;
    KEY_SERVICE.with(|cell| {
        cell.borrow_mut()
            .set(Cbor(key_service.clone()))
            .map_err(storage_error("key service"))
    })?;
    SWEEP_INTERVAL_SECS.with(|cell| {
        cell.borrow_mut()
            .set(sweep_interval)
            .map_err(storage_error("sweep interval"))
    })?;
    DERIVATION_RETRY_LIMIT.with(|cell| {
        cell.borrow_mut()
            .set(retry_limit)
            .map_err(storage_error("retry limit"))
    })?;

    crate::log_info!(
        "Configuration initialized: admin={}, key_service={:?}, sweep_interval={}s, retry_limit={}",
        args.admin_principal,
        key_service,
        sweep_interval,
        retry_limit
    );
    Ok(())
}

pub fn get_admin_principal() -> Principal {
    ADMIN_PRINCIPAL.with(|cell| cell.borrow().get().0)
}

pub fn get_key_service_config() -> KeyServiceConfig {
    KEY_SERVICE.with(|cell| cell.borrow().get().0.clone())
}

pub fn get_sweep_interval_secs() -> u64 {
    SWEEP_INTERVAL_SECS.with(|cell| *cell.borrow().get())
}

pub fn get_derivation_retry_limit() -> u32 {
    DERIVATION_RETRY_LIMIT.with(|cell| *cell.borrow().get())
}
