// src/backend/storage/audit_logs.rs
use crate::models::audit_log::AuditLogEntry;
use crate::models::common::PolicyId;
use crate::storage::memory::{get_audit_log_memory, Memory};
use crate::storage::storable::{Cbor, StorableString};
use ic_stable_structures::StableBTreeMap;
use std::cell::RefCell;

type StorableAuditLogVec = Cbor<Vec<AuditLogEntry>>;

/// Oldest entries are dropped beyond this many per policy.
pub const MAX_ENTRIES_PER_POLICY: usize = 500;

thread_local! {
    /// Audit Logs: Key = "audit:{policy_id}", Value = Vec<AuditLogEntry>
    pub static LOGS: RefCell<StableBTreeMap<StorableString, StorableAuditLogVec, Memory>> = RefCell::new(
        StableBTreeMap::init(get_audit_log_memory())
    );
}

fn create_audit_log_key(policy_id: &PolicyId) -> StorableString {
    Cbor(format!("audit:{}", policy_id))
}

/// Appends an entry to the trail of `entry.policy_id`.
pub fn add_entry(entry: AuditLogEntry) {
    LOGS.with(|map_ref| {
        let key = create_audit_log_key(&entry.policy_id);
        let mut map = map_ref.borrow_mut();

        let mut entries = map.get(&key).map(|cbor| cbor.0).unwrap_or_default();
        entries.push(entry);
        if entries.len() > MAX_ENTRIES_PER_POLICY {
            let excess = entries.len() - MAX_ENTRIES_PER_POLICY;
            entries.drain(..excess);
        }
        map.insert(key, Cbor(entries));
    })
}

pub fn get_entries(policy_id: &PolicyId) -> Vec<AuditLogEntry> {
    LOGS.with(|map_ref| {
        map_ref
            .borrow()
            .get(&create_audit_log_key(policy_id))
            .map(|cbor| cbor.0)
            .unwrap_or_default()
    })
}

pub fn remove_entries(policy_id: &PolicyId) {
    LOGS.with(|map_ref| {
        map_ref.borrow_mut().remove(&create_audit_log_key(policy_id));
    })
}
