// src/backend/models/init.rs
use candid::{CandidType, Principal};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
pub const DEFAULT_DERIVATION_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_KEY_NAME: &str = "key_1";

/// Location of the threshold key-derivation service.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct KeyServiceConfig {
    pub canister_id: Option<Principal>,
    pub key_name: String,
}

impl Default for KeyServiceConfig {
    fn default() -> Self {
        Self {
            canister_id: None,
            key_name: DEFAULT_KEY_NAME.to_string(),
        }
    }
}

#[derive(CandidType, Deserialize, Debug, Clone)]
pub struct InitArgs {
    pub admin_principal: Principal,
    pub key_service: Option<KeyServiceConfig>,
    pub sweep_interval_secs: Option<u64>,
    pub derivation_retry_limit: Option<u32>,
}

/// What a client needs to set up its key-derivation retries.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DerivationSettings {
    pub key_name: String,
    pub retry_limit: u32,
}
