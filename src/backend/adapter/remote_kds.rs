// src/backend/adapter/remote_kds.rs
use crate::crypto::key_derivation::{DerivationContext, EncryptedKeyReply, ThresholdKeyService};
use crate::error::VaultError;
use crate::models::init::KeyServiceConfig;
use candid::{CandidType, Principal};
use futures::future::{FutureExt, LocalBoxFuture};
use ic_cdk::api::call::RejectionCode;
use serde::{Deserialize, Serialize};

const DERIVE_METHOD: &str = "derive_encrypted_key";
const VERIFICATION_KEY_METHOD: &str = "verification_key";

#[derive(CandidType, Serialize, Deserialize, Debug, Clone)]
pub struct DeriveEncryptedKeyArgs {
    pub key_name: String,
    #[serde(with = "serde_bytes")]
    pub context: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub transport_public_key: Vec<u8>,
}

#[derive(CandidType, Serialize, Deserialize, Debug, Clone)]
pub struct VerificationKeyArgs {
    pub key_name: String,
}

/// Threshold key-derivation service reached by inter-canister call.
pub struct RemoteKeyService {
    canister_id: Principal,
    key_name: String,
}

impl RemoteKeyService {
    pub fn new(canister_id: Principal, key_name: String) -> Self {
        Self { canister_id, key_name }
    }

    pub fn from_config(config: &KeyServiceConfig) -> Result<Self, VaultError> {
        let canister_id = config
            .canister_id
            .ok_or_else(|| VaultError::InternalError("key derivation service is not configured".to_string()))?;
        Ok(Self::new(canister_id, config.key_name.clone()))
    }
}

/// Transient system rejections may be retried by the client; any other
/// rejection means the service refused the derivation.
pub fn map_rejection(code: RejectionCode, message: String) -> VaultError {
    match code {
        RejectionCode::SysTransient => VaultError::TransientDerivationFailure(message),
        _ => {
            crate::log_warn!("Key derivation service rejected call ({:?}): {}", code, message);
            VaultError::KeyGenerationNotAllowed
        }
    }
}

impl ThresholdKeyService for RemoteKeyService {
    fn encrypted_key(
        &self,
        transport_public_key: Vec<u8>,
        context: DerivationContext,
    ) -> LocalBoxFuture<'_, Result<EncryptedKeyReply, VaultError>> {
        let args = DeriveEncryptedKeyArgs {
            key_name: self.key_name.clone(),
            context: context.to_bytes(),
            transport_public_key,
        };
        async move {
            let result: Result<(EncryptedKeyReply,), _> =
                ic_cdk::call(self.canister_id, DERIVE_METHOD, (args,)).await;
            result
                .map(|(reply,)| reply)
                .map_err(|(code, message)| map_rejection(code, message))
        }
        .boxed_local()
    }

    fn verification_key(&self) -> LocalBoxFuture<'_, Result<Vec<u8>, VaultError>> {
        let args = VerificationKeyArgs {
            key_name: self.key_name.clone(),
        };
        async move {
            let result: Result<(serde_bytes::ByteBuf,), _> =
                ic_cdk::call(self.canister_id, VERIFICATION_KEY_METHOD, (args,)).await;
            result
                .map(|(key,)| key.into_vec())
                .map_err(|(code, message)| map_rejection(code, message))
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_rejection_is_retryable() {
        assert!(map_rejection(RejectionCode::SysTransient, "busy".into()).is_retryable());
    }

    #[test]
    fn test_other_rejections_deny_the_key() {
        assert_eq!(
            map_rejection(RejectionCode::CanisterReject, "no".into()),
            VaultError::KeyGenerationNotAllowed
        );
        assert_eq!(
            map_rejection(RejectionCode::SysFatal, "gone".into()),
            VaultError::KeyGenerationNotAllowed
        );
    }

    #[test]
    fn test_unconfigured_service_rejected() {
        assert!(RemoteKeyService::from_config(&KeyServiceConfig::default()).is_err());
    }
}
