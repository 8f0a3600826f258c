// src/backend/storage/users.rs
use crate::models::{common::UserId, user::User};
use crate::storage::memory::{get_users_memory, Memory};
use crate::storage::storable::{principal_key, Cbor, StorableString};
use ic_stable_structures::StableBTreeMap;
use std::cell::RefCell;

type StorableUser = Cbor<User>;

thread_local! {
    /// Users: Key = user principal text, Value = User
    pub static USERS: RefCell<StableBTreeMap<StorableString, StorableUser, Memory>> = RefCell::new(
        StableBTreeMap::init(get_users_memory())
    );
}

/// Inserts or replaces a user, returning the previous value.
pub fn insert_user(user: &User) -> Option<User> {
    USERS.with(|map_ref| {
        map_ref
            .borrow_mut()
            .insert(principal_key(&user.id), Cbor(user.clone()))
            .map(|prev| prev.0)
    })
}

pub fn get_user(id: &UserId) -> Option<User> {
    USERS.with(|map_ref| map_ref.borrow().get(&principal_key(id)).map(|cbor| cbor.0))
}

pub fn remove_user(id: &UserId) -> Option<User> {
    USERS.with(|map_ref| map_ref.borrow_mut().remove(&principal_key(id)).map(|cbor| cbor.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candid::Principal;

    #[test]
    fn test_user_crud() {
        let id = Principal::from_slice(&[3; 29]);
        let user = User::new(id, 42);

        assert!(insert_user(&user).is_none());
        assert_eq!(get_user(&id), Some(user.clone()));
        assert_eq!(remove_user(&id), Some(user));
        assert!(get_user(&id).is_none());
    }
}
