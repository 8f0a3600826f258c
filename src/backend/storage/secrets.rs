// src/backend/storage/secrets.rs
use crate::models::{common::SecretId, secret::Secret};
use crate::storage::memory::{get_secrets_memory, Memory};
use crate::storage::storable::{principal_key, Cbor, StorableString};
use ic_stable_structures::StableBTreeMap;
use std::cell::RefCell;

type StorableSecret = Cbor<Secret>;

thread_local! {
    /// Secrets: Key = secret id text, Value = Secret (ciphertexts only)
    pub static SECRETS: RefCell<StableBTreeMap<StorableString, StorableSecret, Memory>> = RefCell::new(
        StableBTreeMap::init(get_secrets_memory())
    );
}

pub fn insert_secret(secret: &Secret) -> Option<Secret> {
    SECRETS.with(|map_ref| {
        map_ref
            .borrow_mut()
            .insert(principal_key(&secret.id), Cbor(secret.clone()))
            .map(|prev| prev.0)
    })
}

pub fn get_secret(id: &SecretId) -> Option<Secret> {
    SECRETS.with(|map_ref| map_ref.borrow().get(&principal_key(id)).map(|cbor| cbor.0))
}

pub fn remove_secret(id: &SecretId) -> Option<Secret> {
    SECRETS.with(|map_ref| map_ref.borrow_mut().remove(&principal_key(id)).map(|cbor| cbor.0))
}
