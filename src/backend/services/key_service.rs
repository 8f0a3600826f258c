// src/backend/services/key_service.rs
// Backend side of root-key derivation: the authorization check that guards
// the threshold service, re-run on every request.

use crate::{
    crypto::key_derivation::{
        DerivationContext, EncryptedKeyReply, KeyDerivationTransport, ThresholdKeyService,
        COMPRESSED_POINT_SIZE,
    },
    error::VaultError,
    metrics,
    models::{
        audit_log::LogAction,
        common::{PrincipalId, Timestamp},
    },
    services::{access_gate, policy_service},
    storage,
    utils::{crypto::fingerprint, guards::check_authenticated},
};
use futures::future::{FutureExt, LocalBoxFuture};

/// SEC1 uncompressed P-256 point.
const UNCOMPRESSED_POINT_SIZE: usize = 65;

fn validate_transport_key(key: &[u8]) -> Result<(), VaultError> {
    if key.len() == COMPRESSED_POINT_SIZE || key.len() == UNCOMPRESSED_POINT_SIZE {
        Ok(())
    } else {
        Err(VaultError::InvalidInput(format!(
            "transport public key must be a SEC1 P-256 point, got {} bytes",
            key.len()
        )))
    }
}

/// Decides whether `caller` may obtain the root key for `context`.
///
/// A user context belongs to that user alone. A policy context is open to its
/// owner, and to its beneficiaries once conditions hold; conditions are
/// re-evaluated here, so the answer reflects `now`. Every denial is
/// `KeyGenerationNotAllowed`.
pub fn authorize_root_key(
    caller: PrincipalId,
    context: &DerivationContext,
    now: Timestamp,
) -> Result<(), VaultError> {
    let decision = match context {
        DerivationContext::User(user) => {
            if check_authenticated(caller).is_ok() && caller == *user {
                Ok(())
            } else {
                Err(VaultError::KeyGenerationNotAllowed)
            }
        }
        DerivationContext::Policy(policy_id) => {
            // Callers with no role on the policy leave no trace in its state or trail.
            match storage::policies::get_policy(policy_id)
                .filter(|policy| access_gate::resolve_role(policy, &caller).is_some())
            {
                None => Err(VaultError::KeyGenerationNotAllowed),
                Some(policy) => {
                    let policy = policy_service::refresh_policy(policy, caller, now)?;
                    let decision = access_gate::authorize_key_derivation(Some(&policy), &caller).map(|_| ());
                    let action = if decision.is_ok() {
                        LogAction::KeyDerivationGranted
                    } else {
                        LogAction::KeyDerivationDenied
                    };
                    policy_service::audit(now, caller, action, policy.id, None);
                    decision
                }
            }
        }
    };

    let tag = fingerprint(&context.to_bytes());
    match &decision {
        Ok(()) => crate::log_info!("Key derivation granted to {} for context {}", caller, tag),
        Err(_) => crate::log_warn!("Key derivation denied to {} for context {}", caller, tag),
    }
    metrics::record_key_derivation(decision.is_ok())?;
    decision
}

/// Authorizes the caller, then forwards the request to the threshold service.
/// Nothing is cached: a second call re-runs the whole check.
pub async fn get_encrypted_root_key<S: ThresholdKeyService + ?Sized>(
    service: &S,
    caller: PrincipalId,
    context: DerivationContext,
    transport_public_key: Vec<u8>,
    now: Timestamp,
) -> Result<EncryptedKeyReply, VaultError> {
    validate_transport_key(&transport_public_key)?;
    authorize_root_key(caller, &context, now)?;
    service.encrypted_key(transport_public_key, context).await
}

pub async fn get_root_key_verification_key<S: ThresholdKeyService + ?Sized>(
    service: &S,
) -> Result<Vec<u8>, VaultError> {
    service.verification_key().await
}

/// In-process transport: a client acting as `caller` at time `now`, going
/// through the same authorization as the public endpoint.
pub struct GatedTransport<'a, S: ?Sized> {
    service: &'a S,
    caller: PrincipalId,
    now: Timestamp,
}

impl<'a, S: ThresholdKeyService + ?Sized> GatedTransport<'a, S> {
    pub fn new(service: &'a S, caller: PrincipalId, now: Timestamp) -> Self {
        Self { service, caller, now }
    }
}

impl<S: ThresholdKeyService + ?Sized> KeyDerivationTransport for GatedTransport<'_, S> {
    fn request_encrypted_key(
        &self,
        transport_public_key: Vec<u8>,
        context: DerivationContext,
    ) -> LocalBoxFuture<'_, Result<EncryptedKeyReply, VaultError>> {
        get_encrypted_root_key(self.service, self.caller, context, transport_public_key, self.now).boxed_local()
    }
}
