// src/backend/storage/mod.rs
// Stable-memory maps and cells, one module per structure.

pub mod audit_logs;
pub mod config;
pub mod memory;
pub mod metrics;
pub mod policies;
pub mod secrets;
pub mod storable;
pub mod users;

pub use memory::Memory;
pub use metrics::{get_metrics, update_metrics};
pub use storable::{Cbor, StorableString};
