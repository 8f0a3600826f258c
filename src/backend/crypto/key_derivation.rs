// src/backend/crypto/key_derivation.rs
//! Client side of threshold key derivation.
//!
//! The caller generates an ephemeral P-256 transport key pair, sends the
//! public half together with a derivation context, and receives the key share
//! encrypted to that transport key plus the service's verification key. The
//! share is decrypted, checked against the verification key and hashed into a
//! [`RootKey`]. The same context always yields the same root key.

use crate::crypto::envelope::{RootKey, KEY_SIZE, NONCE_SIZE};
use crate::error::VaultError;
use crate::models::common::{PolicyId, UserId};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use candid::CandidType;
use elliptic_curve::sec1::ToEncodedPoint;
use futures::future::LocalBoxFuture;
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::PublicKey;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Domain tag of the message the service signs to produce a key share.
pub const DERIVATION_DOMAIN: &[u8] = b"keepsake-derive-v1";
/// HKDF info for the transport encryption key.
pub const TRANSPORT_INFO: &[u8] = b"keepsake-transport-v1";
const ROOT_KEY_DOMAIN: &[u8] = b"keepsake-root-v1";

/// SEC1 compressed P-256 point.
pub const COMPRESSED_POINT_SIZE: usize = 33;

/// What a root key is derived for.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub enum DerivationContext {
    User(UserId),
    Policy(PolicyId),
}

impl DerivationContext {
    /// Tagged encoding; a user id and a policy id never map to the same bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let (tag, id) = match self {
            DerivationContext::User(id) => (&b"user:"[..], id),
            DerivationContext::Policy(id) => (&b"policy:"[..], id),
        };
        let mut bytes = Vec::with_capacity(tag.len() + id.as_slice().len());
        bytes.extend_from_slice(tag);
        bytes.extend_from_slice(id.as_slice());
        bytes
    }
}

/// Message signed by the service for `context`.
pub fn derivation_message(context: &DerivationContext) -> Vec<u8> {
    let mut message = DERIVATION_DOMAIN.to_vec();
    message.extend_from_slice(&context.to_bytes());
    message
}

/// Reply of the derivation service. Both values are opaque to the backend.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct EncryptedKeyReply {
    #[serde(with = "serde_bytes")]
    pub encrypted_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub verification_key: Vec<u8>,
}

/// The threshold key-derivation service as seen by the backend.
pub trait ThresholdKeyService {
    fn encrypted_key(
        &self,
        transport_public_key: Vec<u8>,
        context: DerivationContext,
    ) -> LocalBoxFuture<'_, Result<EncryptedKeyReply, VaultError>>;

    fn verification_key(&self) -> LocalBoxFuture<'_, Result<Vec<u8>, VaultError>>;
}

/// How a client reaches the (authorizing) backend endpoint.
pub trait KeyDerivationTransport {
    fn request_encrypted_key(
        &self,
        transport_public_key: Vec<u8>,
        context: DerivationContext,
    ) -> LocalBoxFuture<'_, Result<EncryptedKeyReply, VaultError>>;
}

/// Derives the AEAD key protecting a key share in transit.
pub fn transport_cipher(
    shared_secret: &[u8],
    transport_public_key: &[u8],
    ephemeral_public_key: &[u8],
) -> Result<Aes256Gcm, VaultError> {
    let mut salt = Vec::with_capacity(transport_public_key.len() + ephemeral_public_key.len());
    salt.extend_from_slice(transport_public_key);
    salt.extend_from_slice(ephemeral_public_key);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(TRANSPORT_INFO, &mut okm[..])
        .map_err(|_| VaultError::InternalError("HKDF expand failed".to_string()))?;
    Aes256Gcm::new_from_slice(&okm[..])
        .map_err(|_| VaultError::InternalError("invalid transport key length".to_string()))
}

/// Ephemeral key pair used for a single derivation round-trip.
pub struct TransportKeyPair {
    secret: EphemeralSecret,
    public_key: PublicKey,
}

impl TransportKeyPair {
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Self {
        let secret = EphemeralSecret::random(rng);
        let public_key = secret.public_key();
        Self { secret, public_key }
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Decrypts the key share, verifies it against the verification key and
    /// hashes it into the root key for `context`.
    pub fn decrypt_and_hash(
        &self,
        reply: &EncryptedKeyReply,
        context: &DerivationContext,
    ) -> Result<RootKey, VaultError> {
        let encrypted = reply.encrypted_key.as_slice();
        if encrypted.len() < COMPRESSED_POINT_SIZE + NONCE_SIZE {
            return Err(VaultError::DecryptionFailed);
        }
        let (ephemeral_bytes, rest) = encrypted.split_at(COMPRESSED_POINT_SIZE);
        let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

        let ephemeral_public =
            PublicKey::from_sec1_bytes(ephemeral_bytes).map_err(|_| VaultError::DecryptionFailed)?;
        let shared = self.secret.diffie_hellman(&ephemeral_public);
        let cipher = transport_cipher(
            shared.raw_secret_bytes().as_slice(),
            &self.public_key_bytes(),
            ephemeral_bytes,
        )?;
        let share = Zeroizing::new(
            cipher
                .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| VaultError::DecryptionFailed)?,
        );

        let verifying_key = VerifyingKey::from_sec1_bytes(&reply.verification_key)
            .map_err(|_| VaultError::DecryptionFailed)?;
        let signature = Signature::from_slice(&share).map_err(|_| VaultError::DecryptionFailed)?;
        verifying_key
            .verify(&derivation_message(context), &signature)
            .map_err(|_| VaultError::DecryptionFailed)?;

        let mut hasher = Sha256::new();
        hasher.update(ROOT_KEY_DOMAIN);
        hasher.update(&reply.verification_key);
        hasher.update(context.to_bytes());
        hasher.update(share.as_slice());
        Ok(RootKey::from_bytes(hasher.finalize().into()))
    }
}

/// Obtains holder-scoped root keys through a [`KeyDerivationTransport`].
pub struct KeyDerivationClient<T> {
    transport: T,
    retry_limit: u32,
    pinned_verification_key: Option<Vec<u8>>,
}

impl<T: KeyDerivationTransport> KeyDerivationClient<T> {
    pub fn new(transport: T, retry_limit: u32) -> Self {
        Self {
            transport,
            retry_limit: retry_limit.max(1),
            pinned_verification_key: None,
        }
    }

    /// Rejects replies whose verification key differs from `key`.
    pub fn with_verification_key(mut self, key: Vec<u8>) -> Self {
        self.pinned_verification_key = Some(key);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Derives the root key for `context`. Transient transport failures are
    /// retried, each time with a fresh transport key pair; every other error
    /// is returned unchanged.
    pub async fn derive_root_key<R: CryptoRngCore>(
        &self,
        context: &DerivationContext,
        rng: &mut R,
    ) -> Result<RootKey, VaultError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let transport_keys = TransportKeyPair::generate(rng);
            let reply = match self
                .transport
                .request_encrypted_key(transport_keys.public_key_bytes(), context.clone())
                .await
            {
                Ok(reply) => reply,
                Err(err) if err.is_retryable() && attempt < self.retry_limit => {
                    crate::log_warn!(
                        "Key derivation attempt {}/{} failed transiently: {}",
                        attempt,
                        self.retry_limit,
                        err
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            if let Some(pinned) = &self.pinned_verification_key {
                if *pinned != reply.verification_key {
                    return Err(VaultError::DecryptionFailed);
                }
            }
            return transport_keys.decrypt_and_hash(&reply, context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::local_kds::LocalKeyService;
    use candid::Principal;
    use futures::executor::block_on;
    use futures::FutureExt;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::cell::Cell;

    struct Direct<'a>(&'a LocalKeyService);

    impl KeyDerivationTransport for Direct<'_> {
        fn request_encrypted_key(
            &self,
            transport_public_key: Vec<u8>,
            context: DerivationContext,
        ) -> LocalBoxFuture<'_, Result<EncryptedKeyReply, VaultError>> {
            self.0.encrypted_key(transport_public_key, context)
        }
    }

    /// Fails transiently a fixed number of times before delegating.
    struct Flaky<'a> {
        inner: &'a LocalKeyService,
        failures_left: Cell<u32>,
        seen_keys: std::cell::RefCell<Vec<Vec<u8>>>,
    }

    impl KeyDerivationTransport for Flaky<'_> {
        fn request_encrypted_key(
            &self,
            transport_public_key: Vec<u8>,
            context: DerivationContext,
        ) -> LocalBoxFuture<'_, Result<EncryptedKeyReply, VaultError>> {
            self.seen_keys.borrow_mut().push(transport_public_key.clone());
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return async { Err(VaultError::TransientDerivationFailure("timeout".into())) }
                    .boxed_local();
            }
            self.inner.encrypted_key(transport_public_key, context)
        }
    }

    struct Refusing;

    impl KeyDerivationTransport for Refusing {
        fn request_encrypted_key(
            &self,
            _transport_public_key: Vec<u8>,
            _context: DerivationContext,
        ) -> LocalBoxFuture<'_, Result<EncryptedKeyReply, VaultError>> {
            async { Err(VaultError::KeyGenerationNotAllowed) }.boxed_local()
        }
    }

    fn service() -> LocalKeyService {
        LocalKeyService::from_seed([11u8; 32]).unwrap()
    }

    fn policy_context(n: u8) -> DerivationContext {
        DerivationContext::Policy(Principal::from_slice(&[n; 29]))
    }

    #[test]
    fn test_context_encoding_is_tagged() {
        let id = Principal::from_slice(&[4; 29]);
        assert_ne!(
            DerivationContext::User(id).to_bytes(),
            DerivationContext::Policy(id).to_bytes()
        );
        assert!(DerivationContext::User(id).to_bytes().starts_with(b"user:"));
    }

    #[test]
    fn test_same_context_same_key() {
        let service = service();
        let client = KeyDerivationClient::new(Direct(&service), 1);
        let mut rng = ChaCha20Rng::from_seed([1u8; 32]);

        let first = block_on(client.derive_root_key(&policy_context(1), &mut rng)).unwrap();
        let second = block_on(client.derive_root_key(&policy_context(1), &mut rng)).unwrap();
        let other = block_on(client.derive_root_key(&policy_context(2), &mut rng)).unwrap();

        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_ne!(first.as_bytes(), other.as_bytes());
    }

    #[test]
    fn test_reply_for_other_transport_key_is_useless() {
        let service = service();
        let mut rng = ChaCha20Rng::from_seed([2u8; 32]);
        let alice = TransportKeyPair::generate(&mut rng);
        let mallory = TransportKeyPair::generate(&mut rng);

        let reply = block_on(service.encrypted_key(alice.public_key_bytes(), policy_context(1))).unwrap();

        assert!(alice.decrypt_and_hash(&reply, &policy_context(1)).is_ok());
        assert_eq!(
            mallory.decrypt_and_hash(&reply, &policy_context(1)).unwrap_err(),
            VaultError::DecryptionFailed
        );
    }

    #[test]
    fn test_share_for_other_context_fails_verification() {
        let service = service();
        let mut rng = ChaCha20Rng::from_seed([3u8; 32]);
        let keys = TransportKeyPair::generate(&mut rng);

        let reply = block_on(service.encrypted_key(keys.public_key_bytes(), policy_context(1))).unwrap();

        assert_eq!(
            keys.decrypt_and_hash(&reply, &policy_context(2)).unwrap_err(),
            VaultError::DecryptionFailed
        );
    }

    #[test]
    fn test_truncated_reply_rejected() {
        let mut rng = ChaCha20Rng::from_seed([4u8; 32]);
        let keys = TransportKeyPair::generate(&mut rng);
        let reply = EncryptedKeyReply {
            encrypted_key: vec![2u8; 10],
            verification_key: vec![],
        };
        assert_eq!(
            keys.decrypt_and_hash(&reply, &policy_context(1)).unwrap_err(),
            VaultError::DecryptionFailed
        );
    }

    #[test]
    fn test_transient_failures_retried_with_fresh_transport_keys() {
        let service = service();
        let transport = Flaky {
            inner: &service,
            failures_left: Cell::new(2),
            seen_keys: Default::default(),
        };
        let client = KeyDerivationClient::new(transport, 3);
        let mut rng = ChaCha20Rng::from_seed([5u8; 32]);

        assert!(block_on(client.derive_root_key(&policy_context(1), &mut rng)).is_ok());

        let seen = client.transport().seen_keys.borrow();
        assert_eq!(seen.len(), 3);
        assert_ne!(seen[0], seen[1]);
        assert_ne!(seen[1], seen[2]);
    }

    #[test]
    fn test_retry_limit_bounds_attempts() {
        let service = service();
        let transport = Flaky {
            inner: &service,
            failures_left: Cell::new(5),
            seen_keys: Default::default(),
        };
        let client = KeyDerivationClient::new(transport, 2);
        let mut rng = ChaCha20Rng::from_seed([6u8; 32]);

        let err = block_on(client.derive_root_key(&policy_context(1), &mut rng)).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(client.transport().seen_keys.borrow().len(), 2);
    }

    #[test]
    fn test_denial_is_not_retried() {
        let client = KeyDerivationClient::new(Refusing, 5);
        let mut rng = ChaCha20Rng::from_seed([7u8; 32]);
        assert_eq!(
            block_on(client.derive_root_key(&policy_context(1), &mut rng)).unwrap_err(),
            VaultError::KeyGenerationNotAllowed
        );
    }

    #[test]
    fn test_pinned_verification_key_mismatch_rejected() {
        let service = service();
        let client = KeyDerivationClient::new(Direct(&service), 1).with_verification_key(vec![0u8; 33]);
        let mut rng = ChaCha20Rng::from_seed([8u8; 32]);
        assert_eq!(
            block_on(client.derive_root_key(&policy_context(1), &mut rng)).unwrap_err(),
            VaultError::DecryptionFailed
        );

        let pinned = block_on(service.verification_key()).unwrap();
        let client = KeyDerivationClient::new(Direct(&service), 1).with_verification_key(pinned);
        assert!(block_on(client.derive_root_key(&policy_context(1), &mut rng)).is_ok());
    }
}
