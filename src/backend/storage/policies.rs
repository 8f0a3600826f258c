// src/backend/storage/policies.rs
use crate::error::VaultError;
use crate::models::{
    common::{PolicyId, PrincipalId},
    policy::Policy,
};
use crate::storage::memory::{get_policies_memory, Memory};
use crate::storage::storable::{principal_key, Cbor, StorableString};
use ic_stable_structures::StableBTreeMap;
use std::cell::RefCell;

type StorablePolicy = Cbor<Policy>;

thread_local! {
    /// Policies: Key = policy id text, Value = Policy
    pub static POLICIES: RefCell<StableBTreeMap<StorableString, StorablePolicy, Memory>> = RefCell::new(
        StableBTreeMap::init(get_policies_memory())
    );
}

/// The single write path for policies. The secrets/key_box check runs before
/// anything is written, so a rejected policy leaves storage untouched.
pub fn commit_policy(policy: &Policy) -> Result<Option<Policy>, VaultError> {
    policy.check_key_box_consistency()?;
    Ok(POLICIES.with(|map_ref| {
        map_ref
            .borrow_mut()
            .insert(principal_key(&policy.id), Cbor(policy.clone()))
            .map(|prev| prev.0)
    }))
}

pub fn get_policy(id: &PolicyId) -> Option<Policy> {
    POLICIES.with(|map_ref| map_ref.borrow().get(&principal_key(id)).map(|cbor| cbor.0))
}

pub fn remove_policy(id: &PolicyId) -> Option<Policy> {
    POLICIES.with(|map_ref| map_ref.borrow_mut().remove(&principal_key(id)).map(|cbor| cbor.0))
}

/// Collects every policy matching `predicate`.
/// Note: full scan; policies are not indexed by participant.
pub fn find_policies<F>(predicate: F) -> Vec<Policy>
where
    F: Fn(&Policy) -> bool,
{
    POLICIES.with(|map_ref| {
        map_ref
            .borrow()
            .iter()
            .map(|(_, cbor)| cbor.0)
            .filter(|policy| predicate(policy))
            .collect()
    })
}

pub fn get_policies_by_owner(owner: &PrincipalId) -> Vec<Policy> {
    find_policies(|policy| policy.owner == *owner)
}
