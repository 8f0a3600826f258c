// src/backend/storage/memory.rs
use ic_stable_structures::memory_manager::{MemoryId, MemoryManager, VirtualMemory};
use ic_stable_structures::DefaultMemoryImpl;
use std::cell::RefCell;

// Non-overlapping ids; never reuse one for a different structure.
const USERS_MEM_ID: MemoryId = MemoryId::new(0);
const SECRETS_MEM_ID: MemoryId = MemoryId::new(1);
const POLICIES_MEM_ID: MemoryId = MemoryId::new(2);
const AUDIT_LOG_MEM_ID: MemoryId = MemoryId::new(3);
const METRICS_MEM_ID: MemoryId = MemoryId::new(4);
// 5-9 reserved
pub(crate) const ADMIN_PRINCIPAL_MEM_ID: MemoryId = MemoryId::new(10);
pub(crate) const KEY_SERVICE_MEM_ID: MemoryId = MemoryId::new(11);
pub(crate) const SWEEP_INTERVAL_MEM_ID: MemoryId = MemoryId::new(12);
pub(crate) const RETRY_LIMIT_MEM_ID: MemoryId = MemoryId::new(13);

pub type Memory = VirtualMemory<DefaultMemoryImpl>;

thread_local! {
    static MEMORY_MANAGER: RefCell<MemoryManager<DefaultMemoryImpl>> = RefCell::new(
        MemoryManager::init(DefaultMemoryImpl::default())
    );
}

pub fn get_memory(id: MemoryId) -> Memory {
    MEMORY_MANAGER.with(|m| m.borrow().get(id))
}

pub fn get_users_memory() -> Memory {
    get_memory(USERS_MEM_ID)
}

pub fn get_secrets_memory() -> Memory {
    get_memory(SECRETS_MEM_ID)
}

pub fn get_policies_memory() -> Memory {
    get_memory(POLICIES_MEM_ID)
}

pub fn get_audit_log_memory() -> Memory {
    get_memory(AUDIT_LOG_MEM_ID)
}

pub fn get_metrics_memory() -> Memory {
    get_memory(METRICS_MEM_ID)
}
