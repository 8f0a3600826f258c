// src/backend/adapter/local_kds.rs
// In-process key-derivation service for local replicas and tests. It holds
// its signing key in canister memory, so production deployments point
// `KeyServiceConfig::canister_id` at the threshold service instead.

use crate::crypto::envelope::NONCE_SIZE;
use crate::crypto::key_derivation::{
    derivation_message, transport_cipher, DerivationContext, EncryptedKeyReply, ThresholdKeyService,
};
use crate::error::VaultError;
use aes_gcm::aead::Aead;
use elliptic_curve::sec1::ToEncodedPoint;
use futures::future::{FutureExt, LocalBoxFuture};
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::PublicKey;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use std::cell::RefCell;

pub struct LocalKeyService {
    signing_key: SigningKey,
    rng: RefCell<ChaCha20Rng>,
}

impl LocalKeyService {
    /// Builds the service from a 32-byte seed. The seed fixes the master key,
    /// so the same seed always derives the same root keys.
    pub fn from_seed(seed: [u8; 32]) -> Result<Self, VaultError> {
        let scalar = Sha256::digest(seed);
        let signing_key = SigningKey::from_slice(&scalar)
            .map_err(|_| VaultError::InternalError("seed does not yield a valid signing key".to_string()))?;
        Ok(Self {
            signing_key,
            rng: RefCell::new(ChaCha20Rng::from_seed(seed)),
        })
    }

    fn verification_key_bytes(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    fn derive(&self, transport_public_key: &[u8], context: &DerivationContext) -> Result<EncryptedKeyReply, VaultError> {
        let transport_key = PublicKey::from_sec1_bytes(transport_public_key)
            .map_err(|_| VaultError::InvalidInput("malformed transport public key".to_string()))?;

        let share: Signature = self.signing_key.sign(&derivation_message(context));

        let mut rng = self.rng.borrow_mut();
        let ephemeral = EphemeralSecret::random(&mut *rng);
        let ephemeral_public = ephemeral.public_key().to_encoded_point(true).as_bytes().to_vec();
        let shared = ephemeral.diffie_hellman(&transport_key);
        let cipher = transport_cipher(
            shared.raw_secret_bytes().as_slice(),
            transport_public_key,
            &ephemeral_public,
        )?;

        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(aes_gcm::Nonce::from_slice(&nonce), share.to_bytes().as_slice())
            .map_err(|_| VaultError::InternalError("share encryption failed".to_string()))?;

        let mut encrypted_key = ephemeral_public;
        encrypted_key.extend_from_slice(&nonce);
        encrypted_key.extend_from_slice(&ciphertext);

        Ok(EncryptedKeyReply {
            encrypted_key,
            verification_key: self.verification_key_bytes(),
        })
    }
}

impl ThresholdKeyService for LocalKeyService {
    fn encrypted_key(
        &self,
        transport_public_key: Vec<u8>,
        context: DerivationContext,
    ) -> LocalBoxFuture<'_, Result<EncryptedKeyReply, VaultError>> {
        let reply = self.derive(&transport_public_key, &context);
        async move { reply }.boxed_local()
    }

    fn verification_key(&self) -> LocalBoxFuture<'_, Result<Vec<u8>, VaultError>> {
        let key = self.verification_key_bytes();
        async move { Ok(key) }.boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candid::Principal;
    use futures::executor::block_on;

    #[test]
    fn test_same_seed_same_verification_key() {
        let a = LocalKeyService::from_seed([1u8; 32]).unwrap();
        let b = LocalKeyService::from_seed([1u8; 32]).unwrap();
        let c = LocalKeyService::from_seed([2u8; 32]).unwrap();
        assert_eq!(block_on(a.verification_key()).unwrap(), block_on(b.verification_key()).unwrap());
        assert_ne!(block_on(a.verification_key()).unwrap(), block_on(c.verification_key()).unwrap());
    }

    #[test]
    fn test_malformed_transport_key_rejected() {
        let service = LocalKeyService::from_seed([1u8; 32]).unwrap();
        let context = DerivationContext::User(Principal::from_slice(&[1; 29]));
        assert!(matches!(
            block_on(service.encrypted_key(vec![0u8; 5], context)),
            Err(VaultError::InvalidInput(_))
        ));
    }
}
