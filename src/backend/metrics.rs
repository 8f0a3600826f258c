// src/backend/metrics.rs
use crate::error::VaultError;
use crate::models::common::Timestamp;
use crate::storage::update_metrics;
use candid::CandidType;
use serde::{Deserialize, Serialize};

/// Canister-wide counters, kept in a stable cell.
#[derive(CandidType, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CoreMetrics {
    pub total_users: u64,
    pub total_secrets: u64,
    pub total_policies: u64,
    /// Policies whose cached conditions status is currently true.
    pub disclosed_policies: u64,
    pub key_derivations_granted: u64,
    pub key_derivations_denied: u64,
    pub votes_cast: u64,
    pub last_sweep_at: Option<Timestamp>,
}

fn adjust(counter: &mut u64, delta: i64) {
    if delta >= 0 {
        *counter = counter.saturating_add(delta as u64);
    } else {
        *counter = counter.saturating_sub(delta.unsigned_abs());
    }
}

pub fn record_users(delta: i64) -> Result<(), VaultError> {
    update_metrics(|m| adjust(&mut m.total_users, delta))
}

pub fn record_secrets(delta: i64) -> Result<(), VaultError> {
    update_metrics(|m| adjust(&mut m.total_secrets, delta))
}

pub fn record_policies(delta: i64) -> Result<(), VaultError> {
    update_metrics(|m| adjust(&mut m.total_policies, delta))
}

/// Tracks a policy's disclosure flag moving from `before` to `after`.
pub fn record_disclosure_change(before: bool, after: bool) -> Result<(), VaultError> {
    match (before, after) {
        (false, true) => update_metrics(|m| adjust(&mut m.disclosed_policies, 1)),
        (true, false) => update_metrics(|m| adjust(&mut m.disclosed_policies, -1)),
        _ => Ok(()),
    }
}

pub fn record_key_derivation(granted: bool) -> Result<(), VaultError> {
    update_metrics(|m| {
        if granted {
            m.key_derivations_granted = m.key_derivations_granted.saturating_add(1);
        } else {
            m.key_derivations_denied = m.key_derivations_denied.saturating_add(1);
        }
    })
}

pub fn record_vote() -> Result<(), VaultError> {
    update_metrics(|m| m.votes_cast = m.votes_cast.saturating_add(1))
}

pub fn record_sweep(now: Timestamp) -> Result<(), VaultError> {
    update_metrics(|m| m.last_sweep_at = Some(now))
}
