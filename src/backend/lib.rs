// src/backend/lib.rs

pub mod adapter;
pub mod api;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

// The canister has no OS entropy. All randomness goes through the internal
// RNG, so any attempt to reach getrandom is a bug and fails loudly.
#[cfg(target_arch = "wasm32")]
fn always_fail(_buf: &mut [u8]) -> Result<(), getrandom::Error> {
    Err(getrandom::Error::UNSUPPORTED)
}

#[cfg(target_arch = "wasm32")]
getrandom::register_custom_getrandom!(always_fail);
