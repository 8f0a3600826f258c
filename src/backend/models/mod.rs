pub mod audit_log;
pub mod common;
pub mod condition;
pub mod init;
pub mod policy;
pub mod secret;
pub mod user;

// Re-export common types/enums for easier access
pub use common::*;
pub use condition::{Condition, ConditionArgs, LogicalOperator, Validator, Vote};
pub use policy::{BeneficiaryPolicyEntry, Policy, ValidatorPolicyView};
pub use secret::{DisclosedSecret, Secret};
pub use user::User;
