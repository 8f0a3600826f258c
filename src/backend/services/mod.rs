pub mod access_gate;
pub mod condition_engine;
pub mod key_service;
pub mod policy_service;
pub mod scheduler;
pub mod secret_service;
pub mod user_service;
