pub mod envelope;
pub mod key_derivation;

pub use envelope::{decrypt, encrypt_new, encrypt_update, rewrap, RootKey};
pub use key_derivation::{
    DerivationContext, EncryptedKeyReply, KeyDerivationClient, KeyDerivationTransport,
    ThresholdKeyService, TransportKeyPair,
};
