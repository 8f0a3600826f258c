// src/backend/utils/rng.rs

use crate::error::VaultError;
use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};
use std::cell::RefCell;

thread_local! {
    // Seeded from raw_rand on init/upgrade; the canister has no OS entropy.
    static INTERNAL_RNG: RefCell<Option<ChaCha20Rng>> = const { RefCell::new(None) };
}

/// Seeds the internal RNG from the management canister's `raw_rand`.
/// Called from a zero-delay timer after init and post_upgrade, since
/// inter-canister calls are not allowed inside those hooks.
pub async fn initialize_internal_rng() -> Result<(), VaultError> {
    let (bytes,) = ic_cdk::api::management_canister::main::raw_rand()
        .await
        .map_err(|(code, msg)| {
            VaultError::InternalError(format!("raw_rand failed: code={:?}, msg={}", code, msg))
        })?;
    let seed: [u8; 32] = bytes
        .get(..32)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| VaultError::InternalError("raw_rand returned insufficient bytes for seed".to_string()))?;
    seed_internal_rng(seed);
    crate::log_info!("Internal RNG initialized successfully.");
    Ok(())
}

/// Installs an RNG from an explicit seed.
pub fn seed_internal_rng(seed: [u8; 32]) {
    INTERNAL_RNG.with(|rng| {
        *rng.borrow_mut() = Some(ChaCha20Rng::from_seed(seed));
    });
}

/// Borrows the initialized internal RNG.
pub fn with_internal_rng<F, R>(f: F) -> Result<R, VaultError>
where
    F: FnOnce(&mut ChaCha20Rng) -> R,
{
    INTERNAL_RNG.with(|rng| {
        let mut borrowed = rng.borrow_mut();
        let rng_instance = borrowed
            .as_mut()
            .ok_or_else(|| VaultError::InternalError("Internal RNG accessed before initialization".to_string()))?;
        Ok(f(rng_instance))
    })
}
