// src/backend/utils/guards.rs
use crate::error::VaultError;
use candid::Principal;

/// Rejects the anonymous principal for state-changing calls.
///
/// # Errors
///
/// Returns `VaultError::NotAuthorized` for the anonymous caller.
pub fn check_authenticated(caller: Principal) -> Result<(), VaultError> {
    if caller == Principal::anonymous() {
        Err(VaultError::NotAuthorized(
            "Anonymous callers cannot use this endpoint".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Checks if the caller is the designated admin principal.
///
/// # Errors
///
/// Returns `VaultError::NotAuthorized` if the caller is not the admin.
pub fn check_admin(caller: Principal, admin_principal: Principal) -> Result<(), VaultError> {
    if caller == admin_principal && caller != Principal::anonymous() {
        Ok(())
    } else {
        Err(VaultError::NotAuthorized("Caller is not the admin".to_string()))
    }
}
